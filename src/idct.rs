//! Fixed-point separable 8x8 inverse DCT.
//!
//! Cosine basis constants are scaled by 2^8 and each 1-D pass ends with a
//! right shift by one, so two passes leave the samples scaled by 2^16. The
//! truncation this introduces is part of the output contract: results must
//! stay bit-identical across runs, so no "more precise" variant may be
//! substituted.

// cos(n * pi / 16) * 2^8
const C1: i32 = 251;
const C2: i32 = 237;
const C3: i32 = 213;
const C4: i32 = 181;
const C5: i32 = 142;
const C6: i32 = 98;
const C7: i32 = 50;

/// 1-D inverse transform over 8 coefficients at stride `step`.
///
/// Even/odd butterfly decomposition of the 8-point IDCT.
fn idct_1d(block: &mut [i32; 64], base: usize, step: usize) {
    let at = |i: usize| block[base + i * step];

    let even0 = C4 * at(0);
    let even1 = C4 * at(4);
    let even2 = C2 * at(2);
    let even3 = C6 * at(2);
    let even4 = C2 * at(6);
    let even5 = C6 * at(6);

    let e0 = even0 + even2 + even1 + even5;
    let e1 = even0 + even3 - even1 - even4;
    let e2 = even0 - even3 - even1 + even4;
    let e3 = even0 - even2 + even1 - even5;

    let o0 = C1 * at(1) + C3 * at(3) + C5 * at(5) + C7 * at(7);
    let o1 = C3 * at(1) - C7 * at(3) - C1 * at(5) - C5 * at(7);
    let o2 = C5 * at(1) - C1 * at(3) + C7 * at(5) + C3 * at(7);
    let o3 = C7 * at(1) - C5 * at(3) + C3 * at(5) - C1 * at(7);

    block[base] = (e0 + o0) >> 1;
    block[base + step] = (e1 + o1) >> 1;
    block[base + 2 * step] = (e2 + o2) >> 1;
    block[base + 3 * step] = (e3 + o3) >> 1;
    block[base + 4 * step] = (e3 - o3) >> 1;
    block[base + 5 * step] = (e2 - o2) >> 1;
    block[base + 6 * step] = (e1 - o1) >> 1;
    block[base + 7 * step] = (e0 - o0) >> 1;
}

/// Transforms a block of dequantized coefficients (natural order) into
/// spatial-domain samples, re-centered around 128.
///
/// No clamping happens here; out-of-range samples are bounded during color
/// conversion.
pub fn inverse_dct(block: &mut [i32; 64]) {
    for row in 0..8 {
        idct_1d(block, row * 8, 1);
    }
    for column in 0..8 {
        idct_1d(block, column, 8);
    }
    for value in block.iter_mut() {
        *value = (*value >> 16) + 128;
    }
}
