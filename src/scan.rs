//! Entropy-coded scan decoding and raster assembly.
//!
//! [`ScanDecoder`] drives the whole back half of the pipeline: it pulls
//! Huffman-coded DC/AC coefficients out of the bit stream one MCU at a time,
//! dequantizes them into natural-order blocks, runs the inverse DCT, merges
//! luma and chroma through the color converters, and places the resulting
//! 8x8 pixel blocks into the padded-resolution raster.

use crate::bits::BitReader;
use crate::color;
use crate::error::Result;
use crate::huffman::HuffmanTables;
use crate::idct::inverse_dct;
use crate::metadata::{Metadata, Sampling, Size};

/// Maps zig-zag scan positions to natural (row-major) block indices.
pub const DEZIGZAG: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, //
    17, 24, 32, 25, 18, 11, 4, 5, //
    12, 19, 26, 33, 40, 48, 41, 34, //
    27, 20, 13, 6, 7, 14, 21, 28, //
    35, 42, 49, 56, 57, 50, 43, 36, //
    29, 22, 15, 23, 30, 37, 44, 51, //
    58, 59, 52, 45, 38, 31, 39, 46, //
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// The end-of-block symbol in an AC coefficient stream.
const EOB: u8 = 0x00;

pub struct ScanDecoder<'a> {
    metadata: &'a Metadata,
    tables: &'a HuffmanTables,
    bits: BitReader<'a>,
    /// Per-component running DC values (the "predictors"). DC coefficients
    /// are coded as differences against these.
    predictors: [i32; 3],
}

impl<'a> ScanDecoder<'a> {
    pub fn new(metadata: &'a Metadata, tables: &'a HuffmanTables, scan_data: &'a [u8]) -> Self {
        Self {
            metadata,
            tables,
            bits: BitReader::new(scan_data),
            predictors: [0; 3],
        }
    }

    /// Decodes the entire scan into a raster of [`Metadata::padded`] size.
    pub fn decode(mut self) -> Result<Vec<u32>> {
        let padded = self.metadata.padded;
        let stride = usize::from(padded.width);
        let mut raster = vec![0u32; stride * usize::from(padded.height)];

        let sampling = self.metadata.sampling;
        let (hsf, vsf) = sampling.factors();
        let mcus_x = usize::from(padded.width / (hsf * 8));
        let mcus_y = usize::from(padded.height / (vsf * 8));
        let num_luma = sampling.luma_blocks();

        let mut luma = [[0i32; 64]; 4];
        // Neutral chroma, so grayscale frames (which never touch these)
        // come out with R = G = B = Y.
        let mut cb = [128i32; 64];
        let mut cr = [128i32; 64];
        let mut rgb = [0u32; 64];

        let restart_interval = self.metadata.restart_interval;
        let mut until_restart = restart_interval;

        for mcu_y in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                for block in luma.iter_mut().take(num_luma) {
                    self.decode_block(0, block)?;
                    inverse_dct(block);
                }
                if self.metadata.num_components > 1 {
                    self.decode_block(1, &mut cb)?;
                    inverse_dct(&mut cb);
                    self.decode_block(2, &mut cr)?;
                    inverse_dct(&mut cr);
                }

                if restart_interval != 0 {
                    until_restart -= 1;
                    if until_restart == 0 {
                        until_restart = restart_interval;
                        self.restart();
                    }
                }

                match sampling {
                    Sampling::TwoByTwo => {
                        // A 16x16 luma area shares one 8x8 chroma pair, so
                        // each luma block maps to a 4x4 chroma quadrant.
                        let (x, y) = (mcu_x * 16, mcu_y * 16);
                        for (index, (dx, dy)) in
                            [(0, 0), (8, 0), (0, 8), (8, 8)].into_iter().enumerate()
                        {
                            let quadrant = dy / 2 * 8 + dx / 2;
                            color::ycbcr_quad(&mut rgb, &luma[index], &cb, &cr, quadrant);
                            write_block(&mut raster, x + dx, y + dy, &rgb, stride);
                        }
                    }
                    Sampling::TwoByOne => {
                        let (x, y) = (mcu_x * 16, mcu_y * 8);
                        color::ycbcr_pair(&mut rgb, &luma[0], &cb, &cr, 0);
                        write_block(&mut raster, x, y, &rgb, stride);
                        color::ycbcr_pair(&mut rgb, &luma[1], &cb, &cr, 4);
                        write_block(&mut raster, x + 8, y, &rgb, stride);
                    }
                    Sampling::OneByOne => {
                        color::ycbcr_full(&mut rgb, &luma[0], &cb, &cr);
                        write_block(&mut raster, mcu_x * 8, mcu_y * 8, &rgb, stride);
                    }
                }
            }
        }

        Ok(raster)
    }

    /// Resets the decoder at a restart interval boundary: all DC predictors
    /// go back to 0 and the bit cursor realigns to the next byte boundary
    /// (the `RST` marker itself is consumed by the bit reader).
    fn restart(&mut self) {
        self.predictors = [0; 3];
        self.bits.align();
    }

    /// Decodes one 8x8 coefficient block of component `comp`, leaving the
    /// dequantized (but untransformed) coefficients in natural order.
    fn decode_block(&mut self, comp: usize, block: &mut [i32; 64]) -> Result<()> {
        let component = &self.metadata.components[comp];
        let dc_tree = self.tables.get(component.dchuff)?;
        let ac_tree = self.tables.get(component.achuff)?;
        let quant = &self.metadata.qtables[usize::from(component.qtable)].values;

        // The DC difference is coded as a Huffman category byte followed by
        // that many magnitude bits, accumulated onto the predictor.
        let category = dc_tree.decode_symbol(&mut self.bits)?;
        self.predictors[comp] += receive(&mut self.bits, category)?;
        block[0] = self.predictors[comp] * i32::from(quant[0]);

        // AC symbols carry a zero run length in the high nibble and the
        // category in the low nibble. Dequantization uses the quantizer at
        // the *scan* position (both the bitstream and the DQT table are in
        // zig-zag order); only the destination index is de-zig-zagged.
        let mut i = 1;
        while i < 64 {
            let symbol = ac_tree.decode_symbol(&mut self.bits)?;
            if symbol == EOB {
                for k in i..64 {
                    block[usize::from(DEZIGZAG[k])] = 0;
                }
                break;
            }

            let mut run = symbol >> 4;
            let category = symbol & 0xf;
            let coefficient = receive(&mut self.bits, category)?;

            while run > 0 && i < 64 {
                block[usize::from(DEZIGZAG[i])] = 0;
                i += 1;
                run -= 1;
            }
            if i < 64 {
                block[usize::from(DEZIGZAG[i])] = coefficient * i32::from(quant[i]);
            }
            i += 1;
        }

        Ok(())
    }
}

/// Reads a `category`-bit coefficient value.
///
/// A bit string starting with 1 is the positive magnitude in plain binary.
/// A bit string starting with 0 codes a negative value: the magnitude is the
/// complement of the remaining bits, prefixed with an implicit 1.
fn receive(bits: &mut BitReader<'_>, mut category: u8) -> Result<i32> {
    if category == 0 {
        return Ok(0);
    }

    let negative = bits.read_bit()? == 0;
    let mut coefficient: i32 = 1;
    while category > 1 {
        category -= 1;
        let bit = i32::from(bits.read_bit()?);
        coefficient = (coefficient << 1) | if negative { bit ^ 1 } else { bit };
    }
    Ok(if negative { -coefficient } else { coefficient })
}

/// Copies an 8x8 pixel block into the raster at pixel position (`x`, `y`).
fn write_block(raster: &mut [u32], x: usize, y: usize, rgb: &[u32; 64], stride: usize) {
    for (row, source) in rgb.chunks_exact(8).enumerate() {
        let offset = (y + row) * stride + x;
        raster[offset..offset + 8].copy_from_slice(source);
    }
}

/// Produces the final output surface from the decoded padded raster.
///
/// When the requested size matches the declared image size, rows are copied
/// verbatim (dropping the padding columns/rows). Anything else is resampled
/// with nearest-neighbor stepping over the *padded* raster.
pub fn render(
    raster: &[u32],
    declared: Size,
    padded: Size,
    output_width: u16,
    output_height: u16,
) -> Vec<u32> {
    let stride = usize::from(padded.width);
    let mut surface = Vec::with_capacity(usize::from(output_width) * usize::from(output_height));

    if output_width == declared.width && output_height == declared.height {
        for y in 0..usize::from(declared.height) {
            surface.extend_from_slice(&raster[y * stride..][..usize::from(declared.width)]);
        }
    } else {
        let dx = f64::from(padded.width) / f64::from(output_width);
        let dy = f64::from(padded.height) / f64::from(output_height);
        for y in 0..u32::from(output_height) {
            let row = (f64::from(y) * dy) as usize * stride;
            let mut sample = row as f64;
            for _ in 0..output_width {
                surface.push(raster[sample as usize]);
                sample += dx;
            }
        }
    }

    surface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::HuffTree;
    use crate::metadata::{Component, QTable};

    #[test]
    fn dezigzag_is_a_bijection() {
        let mut seen = [false; 64];
        for &index in &DEZIGZAG {
            assert!(!seen[usize::from(index)], "duplicate index {index}");
            seen[usize::from(index)] = true;
        }
    }

    #[test]
    fn coefficient_sign_magnitude() {
        // Category 3, bits `101`: positive 5.
        let mut bits = BitReader::new(&[0b1010_0000]);
        assert_eq!(receive(&mut bits, 3).unwrap(), 5);

        // Category 3, bits `011`: complement rule, -4.
        let mut bits = BitReader::new(&[0b0110_0000]);
        assert_eq!(receive(&mut bits, 3).unwrap(), -4);

        // Category 1: single sign bit.
        let mut bits = BitReader::new(&[0b0100_0000]);
        assert_eq!(receive(&mut bits, 1).unwrap(), -1);
        assert_eq!(receive(&mut bits, 1).unwrap(), 1);

        // Category 0 consumes nothing.
        let mut bits = BitReader::new(&[]);
        assert_eq!(receive(&mut bits, 0).unwrap(), 0);
    }

    /// Builds a decode context with synthetic single-purpose Huffman tables:
    /// DC codes `00` -> category 2 and `01` -> category 3, AC code `0` -> EOB.
    fn synthetic_context(quant: [u16; 64], restart_interval: u16) -> (Metadata, HuffmanTables) {
        let mut dc_counts = [0u8; 16];
        dc_counts[1] = 2;
        let mut ac_counts = [0u8; 16];
        ac_counts[0] = 1;

        let mut tables = HuffmanTables::new();
        tables.set(0, HuffTree::build(&dc_counts, &[2, 3]).unwrap());
        tables.set(1, HuffTree::build(&ac_counts, &[EOB]).unwrap());

        let component = Component {
            qtable: 0,
            dchuff: 0,
            achuff: 1,
        };
        let metadata = Metadata {
            declared: Size {
                width: 8,
                height: 8,
            },
            padded: Size {
                width: 8,
                height: 8,
            },
            num_components: 1,
            sampling: Sampling::OneByOne,
            restart_interval,
            qtables: [QTable { values: quant }, QTable::zeroed()],
            components: [component; 3],
        };
        (metadata, tables)
    }

    #[test]
    fn dc_predictor_accumulates() {
        // Two blocks with DC differences +5 and -3:
        // `01 101 0` (category 3, +5, EOB) and `00 00 0` (category 2, -3, EOB).
        let (metadata, tables) = synthetic_context([1; 64], 0);
        let mut decoder = ScanDecoder::new(&metadata, &tables, &[0b0110_1000, 0b0000_0000]);

        let mut block = [0i32; 64];
        decoder.decode_block(0, &mut block).unwrap();
        assert_eq!(block[0], 5);
        decoder.decode_block(0, &mut block).unwrap();
        assert_eq!(block[0], 2);
    }

    #[test]
    fn restart_resets_predictor() {
        // Same two blocks, but with a RST marker between them: the second
        // block's DC value equals its raw difference again.
        let (metadata, tables) = synthetic_context([1; 64], 1);
        let data = [0b0110_1000, 0xFF, 0xD0, 0b0000_0000];
        let mut decoder = ScanDecoder::new(&metadata, &tables, &data);

        let mut block = [0i32; 64];
        decoder.decode_block(0, &mut block).unwrap();
        assert_eq!(block[0], 5);
        decoder.restart();
        decoder.decode_block(0, &mut block).unwrap();
        assert_eq!(block[0], -3);
    }

    #[test]
    fn ac_run_length_and_zigzag_placement() {
        // DC category 0, then AC symbol 0x31 (run 3, category 1) with bit
        // `1`, then EOB. The coefficient sits at scan position 4, which
        // de-zig-zags to natural index 9, and is scaled by quant[4].
        let mut dc_counts = [0u8; 16];
        dc_counts[0] = 1;
        let mut ac_counts = [0u8; 16];
        ac_counts[1] = 2;

        let mut tables = HuffmanTables::new();
        tables.set(0, HuffTree::build(&dc_counts, &[0]).unwrap());
        tables.set(1, HuffTree::build(&ac_counts, &[0x31, EOB]).unwrap());

        let mut quant = [0u16; 64];
        for (i, q) in quant.iter_mut().enumerate() {
            *q = i as u16 + 1;
        }
        let (mut metadata, _) = synthetic_context(quant, 0);
        metadata.components[0].achuff = 1;

        // Bits: DC `0`, AC `00` + `1`, EOB `01`.
        let mut decoder = ScanDecoder::new(&metadata, &tables, &[0b0001_0100]);
        let mut block = [-1i32; 64];
        decoder.decode_block(0, &mut block).unwrap();

        assert_eq!(block[9], 5);
        for (i, &value) in block.iter().enumerate() {
            if i != 9 {
                assert_eq!(value, 0, "natural index {i}");
            }
        }
    }

    #[test]
    fn render_exact_size_drops_padding() {
        let declared = Size {
            width: 2,
            height: 2,
        };
        let padded = Size {
            width: 8,
            height: 8,
        };
        let mut raster = vec![0u32; 64];
        raster[0] = 1;
        raster[1] = 2;
        raster[8] = 3;
        raster[9] = 4;

        assert_eq!(render(&raster, declared, padded, 2, 2), [1, 2, 3, 4]);
    }

    #[test]
    fn render_resamples_to_requested_size() {
        let declared = Size {
            width: 8,
            height: 8,
        };
        let padded = declared;
        let raster: Vec<u32> = (0..64).collect();

        let out = render(&raster, declared, padded, 4, 4);
        assert_eq!(out.len(), 16);
        // Nearest-neighbor with a step of 2: every other sample of every
        // other row.
        assert_eq!(out[..4], [0, 2, 4, 6]);
        assert_eq!(out[4..8], [16, 18, 20, 22]);

        let out = render(&raster, declared, padded, 16, 2);
        assert_eq!(out.len(), 32);
        assert_eq!(out[..4], [0, 0, 1, 1]);
    }
}
