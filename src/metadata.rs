//! The distilled frame description the scan decoder works from.

/// An image dimension pair, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

/// The luminance sampling layouts this decoder supports. Chrominance is
/// always sampled at 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// 2x2 luma blocks per MCU (4:2:0).
    TwoByTwo,
    /// 2x1 luma blocks per MCU (4:2:2).
    TwoByOne,
    /// One luma block per MCU (4:4:4, also used for grayscale).
    OneByOne,
}

impl Sampling {
    /// Number of luminance data units per MCU.
    pub fn luma_blocks(&self) -> usize {
        match self {
            Sampling::TwoByTwo => 4,
            Sampling::TwoByOne => 2,
            Sampling::OneByOne => 1,
        }
    }

    /// Horizontal / vertical sampling factors of the luminance component.
    pub fn factors(&self) -> (u16, u16) {
        match self {
            Sampling::TwoByTwo => (2, 2),
            Sampling::TwoByOne => (2, 1),
            Sampling::OneByOne => (1, 1),
        }
    }
}

/// A dequantization table, in the zig-zag storage order of the DQT segment.
#[derive(Debug, Clone, Copy)]
pub struct QTable {
    pub values: [u16; 64],
}

impl QTable {
    pub fn zeroed() -> Self {
        Self { values: [0; 64] }
    }
}

/// Per-component decode parameters, fixed once the header is parsed.
#[derive(Debug, Clone, Copy)]
pub struct Component {
    /// Index into [`Metadata::qtables`].
    pub qtable: u8,
    /// DC table slot, `(Th << 1) | 0`.
    pub dchuff: u8,
    /// AC table slot, `(Th << 1) | 1`.
    pub achuff: u8,
}

/// Everything the entropy decoder and raster assembler need to know about
/// the frame. Immutable once [`Decoder::open`][crate::Decoder::open] returns.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// The frame size declared in the SOF header.
    pub declared: Size,
    /// [`Metadata::declared`] rounded up to the next multiple of
    /// `8 * sampling factor` in each direction. The raster is assembled at
    /// this size; the padding is discarded (or resampled over) on output.
    pub padded: Size,
    pub num_components: u8,
    pub sampling: Sampling,
    /// MCUs per restart interval; 0 disables restart handling.
    pub restart_interval: u16,
    /// Dequantization tables. Slot 0 is assumed to be luminance and slot 1
    /// chrominance, matching the common encoder convention. The JPEG standard
    /// does not guarantee this association; files that deviate are not
    /// detected.
    pub qtables: [QTable; 2],
    /// Y, Cb, Cr decode parameters. Cb and Cr share their table slots for
    /// single-table encoders; for grayscale frames only index 0 is used.
    pub components: [Component; 3],
}

impl Metadata {
    /// Rounds `declared` up to the padded raster size for the given sampling
    /// layout.
    pub fn padded_size(declared: Size, sampling: Sampling) -> Size {
        let (h, v) = sampling.factors();
        Size {
            width: ((declared.width - 1) | (h * 8 - 1)) + 1,
            height: ((declared.height - 1) | (v * 8 - 1)) + 1,
        }
    }
}
