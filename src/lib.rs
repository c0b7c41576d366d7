//! A baseline sequential JPEG decoder.
//!
//! This crate decodes baseline DCT JPEG images (the overwhelmingly common
//! variant) into packed-RGB pixel buffers, without pulling in an external
//! imaging dependency. The full pipeline is implemented here: segment
//! parsing, canonical Huffman decoding, dequantization, a fixed-point
//! inverse DCT, chroma upsampling, color conversion, and assembly of the
//! decoded blocks into a raster that can be returned at any requested size.
//!
//! If [`Decoder::open`] returns an error, the file is either malformed or
//! uses a feature this decoder does not support ([`ErrorKind`] tells the two
//! apart); progressive, extended-sequential, lossless, and arithmetic-coded
//! JPEGs are rejected, as are sampling layouts other than 4:4:4, 4:2:2, and
//! 4:2:0, and frames whose component ids follow neither the 1/2/3 nor the
//! zero-based 0/1/2 Y/Cb/Cr convention.

mod bits;
mod color;
mod error;
mod file;
mod huffman;
mod idct;
mod metadata;
mod scan;

use std::{borrow::Cow, fmt, path::Path};

use error::Result;
use file::{JpegParser, SegmentKind, SofMarker};
use huffman::{HuffTree, HuffmanTables};
use metadata::{Component, Metadata, QTable};

pub use error::{Error, ErrorKind};
pub use file::{DensityUnit, Jfif};
pub use metadata::{Sampling, Size};

macro_rules! bail {
    (structural, $($args:tt)*) => {
        return Err(Error::structural(format!($($args)*)))
    };
    (unsupported, $($args:tt)*) => {
        return Err(Error::unsupported(format!($($args)*)))
    };
}

/// An open decode session for a single JPEG image.
///
/// Created by [`Decoder::open`] or [`Decoder::new`], which parse all header
/// segments up to the start of the entropy-coded scan. The pixel data itself
/// is decoded by [`Decoder::read`]. All tables and buffers are owned by the
/// session and released when it is dropped, whether or not `read` ever ran.
pub struct Decoder<'a> {
    metadata: Metadata,
    huffman: HuffmanTables,
    jfif: Option<Jfif>,
    jpeg: Cow<'a, [u8]>,
    scan_data_offset: usize,
    scan_data_len: usize,
}

impl Decoder<'static> {
    /// Opens and parses the headers of the JPEG file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::new_impl(Cow::Owned(bytes))
    }
}

impl<'a> Decoder<'a> {
    /// Parses the headers of an in-memory JPEG file.
    pub fn new(jpeg: impl Into<Cow<'a, [u8]>>) -> Result<Self> {
        Self::new_impl(jpeg.into())
    }

    fn new_impl(jpeg: Cow<'a, [u8]>) -> Result<Self> {
        let mut declared = None;
        let mut sampling = None;
        let mut num_components = 0u8;
        let mut component_ids = [0u8; 3];
        let mut restart_interval = 0u16;
        let mut qtables = [QTable::zeroed(); 2];
        let mut qtable_refs = [0u8; 3];
        let mut huffman = HuffmanTables::new();
        let mut jfif = None;
        let mut scan_data = None;
        let mut components = [Component {
            qtable: 0,
            dchuff: 0,
            achuff: 1,
        }; 3];

        let mut parser = JpegParser::new(&jpeg)?;
        while let Some(segment) = parser.next_segment()? {
            match segment.as_segment_kind() {
                Some(SegmentKind::App(app)) => match app.jfif() {
                    Some(header) => {
                        log::trace!("JFIF header: {:?}", header);
                        jfif = Some(*header);
                    }
                    None => log::trace!("skipping APP{} segment", app.n()),
                },
                Some(SegmentKind::Sof(sof)) => {
                    if sof.marker() != SofMarker::BASELINE {
                        bail!(
                            unsupported,
                            "unsupported frame type: {} ({:?})",
                            sof.marker().process(),
                            sof.marker(),
                        );
                    }
                    if sof.precision() != 8 {
                        bail!(
                            unsupported,
                            "sample precision of {} bits is not supported",
                            sof.precision()
                        );
                    }
                    if declared.is_some() {
                        bail!(structural, "encountered multiple SOF markers");
                    }
                    if sof.width() == 0 || sof.height() == 0 {
                        bail!(
                            structural,
                            "frame with zero size ({}x{})",
                            sof.width(),
                            sof.height(),
                        );
                    }

                    log::trace!("frame components: {:?}", sof.components());

                    let layout = match sof.components() {
                        // A single-component scan is never interleaved: each
                        // MCU is one data unit, whatever sampling factors the
                        // frame header declares.
                        [_] => Sampling::OneByOne,
                        [y, cb, cr] => {
                            // JFIF numbers the components 1/2/3; some
                            // encoders count from 0 instead. Anything else
                            // could bind a plane to the wrong role.
                            let ids = [y.id(), cb.id(), cr.id()];
                            if ids != [1, 2, 3] && ids != [0, 1, 2] {
                                bail!(
                                    unsupported,
                                    "component ids {ids:?} not supported (expected 1/2/3 or 0/1/2 = Y/Cb/Cr)"
                                );
                            }
                            component_ids = ids;
                            for chroma in [cb, cr] {
                                if (chroma.horizontal_sampling(), chroma.vertical_sampling())
                                    != (1, 1)
                                {
                                    bail!(
                                        unsupported,
                                        "chroma sampling factors {}x{} not supported",
                                        chroma.horizontal_sampling(),
                                        chroma.vertical_sampling(),
                                    );
                                }
                            }
                            match (y.horizontal_sampling(), y.vertical_sampling()) {
                                (2, 2) => Sampling::TwoByTwo,
                                (2, 1) => Sampling::TwoByOne,
                                (1, 1) => Sampling::OneByOne,
                                (h, v) => {
                                    bail!(
                                        unsupported,
                                        "luma sampling factors {h}x{v} not supported"
                                    )
                                }
                            }
                        }
                        other => {
                            bail!(
                                unsupported,
                                "frame with {} components is not supported",
                                other.len()
                            );
                        }
                    };

                    sampling = Some(layout);

                    for (i, component) in sof.components().iter().enumerate() {
                        if component.qtable() > 1 {
                            bail!(
                                unsupported,
                                "quantization table id {} not supported (only 0 and 1)",
                                component.qtable()
                            );
                        }
                        qtable_refs[i] = component.qtable();
                    }

                    num_components = sof.components().len() as u8;
                    declared = Some(Size {
                        width: sof.width(),
                        height: sof.height(),
                    });
                }
                Some(SegmentKind::Dqt(dqt)) => {
                    for table in dqt.tables() {
                        if table.precision() != 0 {
                            bail!(unsupported, "16-bit quantization tables are not supported");
                        }
                        match table.id() {
                            id @ (0 | 1) => {
                                let slot = &mut qtables[usize::from(id)].values;
                                for (dest, &src) in slot.iter_mut().zip(table.values()) {
                                    *dest = u16::from(src);
                                }
                            }
                            id => log::warn!("ignoring quantization table with unknown id {id}"),
                        }
                    }
                }
                Some(SegmentKind::Dht(dht)) => {
                    for table in dht.tables() {
                        let class = match table.class() {
                            class @ (0 | 1) => class,
                            other => {
                                bail!(structural, "invalid Huffman table class {other}")
                            }
                        };
                        if table.id() > 1 {
                            bail!(
                                unsupported,
                                "Huffman table id {} not valid in baseline JPEGs",
                                table.id()
                            );
                        }

                        let index = (table.id() << 1) | class;
                        huffman.set(index, HuffTree::build(table.counts(), table.symbols())?);
                    }
                }
                Some(SegmentKind::Dri(dri)) => {
                    restart_interval = dri.mcus();
                }
                Some(SegmentKind::Sos(sos)) => {
                    if sos.spectral_start() != 0 || sos.spectral_end() != 63 || sos.approx() != 0 {
                        bail!(structural, "non-baseline scan header");
                    }
                    if declared.is_none() {
                        bail!(structural, "SOS not preceded by SOF header");
                    }
                    if sos.components().len() != usize::from(num_components) {
                        bail!(
                            structural,
                            "scan has {} components, frame has {num_components}",
                            sos.components().len()
                        );
                    }

                    log::trace!("scan components: {:?}", sos.components());

                    for (i, scan_component) in sos.components().iter().enumerate() {
                        if num_components == 3 && scan_component.selector() != component_ids[i] {
                            bail!(
                                structural,
                                "scan component selector {} does not match frame component id {}",
                                scan_component.selector(),
                                component_ids[i],
                            );
                        }
                        if scan_component.dc_table() > 1 || scan_component.ac_table() > 1 {
                            bail!(
                                unsupported,
                                "entropy table ids {}/{} not valid in baseline JPEGs",
                                scan_component.dc_table(),
                                scan_component.ac_table(),
                            );
                        }
                        components[i] = Component {
                            qtable: qtable_refs[i],
                            dchuff: scan_component.dc_table() << 1,
                            achuff: (scan_component.ac_table() << 1) | 1,
                        };
                    }

                    scan_data = Some((sos.data_offset(), sos.data().len()));
                    // The scan data is the last thing `read` needs; anything
                    // after it (including EOI) is irrelevant.
                    break;
                }
                _ => {}
            }
        }

        let (Some(declared), Some(sampling), Some((scan_data_offset, scan_data_len))) =
            (declared, sampling, scan_data)
        else {
            bail!(structural, "missing SOF or SOS segment");
        };

        let metadata = Metadata {
            declared,
            padded: Metadata::padded_size(declared, sampling),
            num_components,
            sampling,
            restart_interval,
            qtables,
            components,
        };

        Ok(Self {
            metadata,
            huffman,
            jfif,
            jpeg,
            scan_data_offset,
            scan_data_len,
        })
    }

    /// Returns the image width declared in the frame header, in pixels.
    #[inline]
    pub fn width(&self) -> u16 {
        self.metadata.declared.width
    }

    /// Returns the image height declared in the frame header, in pixels.
    #[inline]
    pub fn height(&self) -> u16 {
        self.metadata.declared.height
    }

    /// Returns the number of components in the frame (1 for grayscale, 3
    /// for YCbCr).
    #[inline]
    pub fn num_components(&self) -> u8 {
        self.metadata.num_components
    }

    /// Returns the luminance sampling layout of the frame.
    #[inline]
    pub fn sampling(&self) -> Sampling {
        self.metadata.sampling
    }

    /// Returns the JFIF header, if the file carried one in APP0.
    #[inline]
    pub fn jfif(&self) -> Option<&Jfif> {
        self.jfif.as_ref()
    }

    /// Decodes the entropy-coded scan and returns the image as an
    /// `output_width` x `output_height` surface.
    ///
    /// If the requested size matches [`Decoder::width`]/[`Decoder::height`],
    /// the native pixels are returned; any other size is produced by
    /// nearest-neighbor resampling. Decoding is deterministic: the same
    /// input bytes always produce the same pixels.
    pub fn read(&self, output_width: u16, output_height: u16) -> Result<PixelBuffer> {
        if output_width == 0 || output_height == 0 {
            bail!(structural, "requested output surface is empty");
        }

        let scan_data = &self.jpeg[self.scan_data_offset..][..self.scan_data_len];
        let raster = scan::ScanDecoder::new(&self.metadata, &self.huffman, scan_data).decode()?;
        let pixels = scan::render(
            &raster,
            self.metadata.declared,
            self.metadata.padded,
            output_width,
            output_height,
        );

        Ok(PixelBuffer {
            width: output_width,
            height: output_height,
            pixels,
        })
    }
}

impl fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("metadata", &self.metadata)
            .field("jfif", &self.jfif)
            .field("scan_data", &format_args!("<{} bytes>", self.scan_data_len))
            .finish()
    }
}

/// A decoded image: `width * height` packed `0x00RRGGBB` words in row-major
/// order.
pub struct PixelBuffer {
    width: u16,
    height: u16,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the pixel data, one `0x00RRGGBB` word per pixel.
    #[inline]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Consumes the buffer, returning the pixel data.
    #[inline]
    pub fn into_vec(self) -> Vec<u32> {
        self.pixels
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("<{} pixels>", self.pixels.len()))
            .finish()
    }
}
