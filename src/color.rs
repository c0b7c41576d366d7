//! YCbCr to packed-RGB conversion with chroma replication.
//!
//! One converter per supported sampling layout, each turning one 8x8
//! luminance block plus (a window into) the chrominance blocks into 64
//! packed `0x00RRGGBB` pixels. Chroma samples are replicated over the luma
//! samples they cover; there is no interpolation.
//!
//! The conversion uses integer-scaled multipliers:
//! red = Y + 45/32 * Cr, green = Y - (11 * Cb + 23 * Cr)/32,
//! blue = Y + 113/64 * Cb (with Cb/Cr re-centered around 0).

fn bound(value: i32) -> u32 {
    value.clamp(0, 255) as u32
}

#[derive(Clone, Copy)]
struct ChromaTerms {
    red: i32,
    green: i32,
    blue: i32,
}

impl ChromaTerms {
    fn new(cb: i32, cr: i32) -> Self {
        let cb = cb - 128;
        let cr = cr - 128;
        Self {
            red: 45 * cr / 32,
            green: (11 * cb + 23 * cr) / 32,
            blue: 113 * cb / 64,
        }
    }

    fn apply(&self, y: i32) -> u32 {
        (bound(y + self.red) << 16) | (bound(y - self.green) << 8) | bound(y + self.blue)
    }
}

/// 4:4:4 / grayscale: every pixel has its own chroma sample.
pub fn ycbcr_full(rgb: &mut [u32; 64], y: &[i32; 64], cb: &[i32; 64], cr: &[i32; 64]) {
    for i in 0..64 {
        rgb[i] = ChromaTerms::new(cb[i], cr[i]).apply(y[i]);
    }
}

/// 4:2:2: each chroma sample covers two horizontally adjacent luma samples.
///
/// `half` selects the chroma window for the left (0) or right (4) luma block
/// of the MCU; within the block, the chroma index is the halved flat sample
/// index.
pub fn ycbcr_pair(rgb: &mut [u32; 64], y: &[i32; 64], cb: &[i32; 64], cr: &[i32; 64], half: usize) {
    let mut j = half;
    let mut i = 0;
    while i < 64 {
        let terms = ChromaTerms::new(cb[j], cr[j]);
        rgb[i] = terms.apply(y[i]);
        i += 1;
        rgb[i] = terms.apply(y[i]);
        i += 1;
        j += 1;
    }
}

/// 4:2:0: each chroma sample covers a 2x2 luma area, so one luma block maps
/// onto a 4x4 quadrant of the chroma blocks.
///
/// `quadrant` is the chroma start index of the luma block within its MCU:
/// 0 (top left), 4 (top right), 32 (bottom left), or 36 (bottom right).
pub fn ycbcr_quad(
    rgb: &mut [u32; 64],
    y: &[i32; 64],
    cb: &[i32; 64],
    cr: &[i32; 64],
    quadrant: usize,
) {
    let mut i = 0;
    for row in 0..8usize {
        let mut j = quadrant + ((row & 6) << 2);
        for _ in 0..4 {
            let terms = ChromaTerms::new(cb[j], cr[j]);
            rgb[i] = terms.apply(y[i]);
            i += 1;
            rgb[i] = terms.apply(y[i]);
            i += 1;
            j += 1;
        }
    }
}
