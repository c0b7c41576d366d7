//! JPEG/JFIF segment parser.
//!
//! [`JpegParser`] walks the marker-delimited header structure of a JPEG file
//! and hands out one [`Segment`] at a time. It decodes the segments the
//! decoder cares about (SOF, DQT, DHT, SOS, DRI, APP0) into structured form
//! and skips everything else by its declared length. The entropy-coded scan
//! data is *not* decoded here; the SOS segment only records its extent.

#[cfg(test)]
mod tests;

use std::{fmt, mem};

use bytemuck::AnyBitPattern;

use crate::error::{Error, Result};

pub struct JpegParser<'a> {
    reader: Reader<'a>,
}

impl<'a> JpegParser<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut reader = Reader { buf, position: 0 };
        if reader.read_u8()? != 0xFF || reader.read_u8()? != 0xD8 {
            return Err(Error::structural(
                "JPEG image does not start with SOI marker",
            ));
        }
        Ok(Self { reader })
    }

    /// Reads the next [`Segment`] from the JPEG data.
    ///
    /// `SOI` is consumed by [`JpegParser::new`] and `EOI` ends the iteration
    /// with `Ok(None)`, so neither is ever returned. Data stored after the
    /// EOI marker can be retrieved with [`JpegParser::remaining`].
    pub fn next_segment(&mut self) -> Result<Option<Segment<'a>>> {
        // Skip fill bytes in front of the marker.
        while self.reader.read_u8()? != 0xff {}

        let segment_offset = self.reader.position - 1;
        let marker = self.reader.read_u8()?;

        if marker == 0x00 {
            return Err(Error::structural("invalid ff 00 marker"));
        }

        if marker == 0xD9 {
            // EOI
            if !self.reader.remaining().is_empty() {
                log::warn!(
                    "ignoring {} trailing bytes after EOI",
                    self.reader.remaining().len()
                );
            }

            return Ok(None);
        }

        // Every remaining marker (standalone SOI/EOI/RSTn/TEM are either
        // handled above or invalid outside the scan data) is followed by a
        // 2-byte segment length, even markers we don't recognize.
        let length = usize::from(self.reader.read_length()?);
        let expected_end = self.reader.position + length;
        let mut reader = Reader {
            buf: &self.reader.buf[..expected_end],
            position: self.reader.position,
        };
        let kind = match marker {
            0xDB => Some(SegmentKind::Dqt(self.read_dqt(&mut reader)?)),
            0xC4 => Some(SegmentKind::Dht(self.read_dht(&mut reader)?)),
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                Some(SegmentKind::Sof(self.read_sof(marker, &mut reader)?))
            }
            0xDA => Some(SegmentKind::Sos(self.read_sos(&mut reader)?)),
            0xDD => Some(SegmentKind::Dri(Dri {
                mcus: reader.read_u16()?,
            })),
            0xE0..=0xEF => Some(SegmentKind::App(self.read_app(marker, &mut reader)?)),
            _ => {
                self.reader.position = expected_end;
                None
            }
        };

        // Re-sync to the declared segment end so the next marker read starts
        // in the right place (SOS already advanced past its scan data).
        if marker != 0xDA {
            if kind.is_some() && reader.position < expected_end {
                log::warn!(
                    "ff {:02x} segment declared {} bytes, {} remain after decoding",
                    marker,
                    length,
                    expected_end - reader.position,
                );
            }
            self.reader.position = expected_end;
        }

        Ok(Some(Segment {
            marker,
            raw_bytes: &self.reader.buf[segment_offset + 4..][..length],
            offset: segment_offset,
            kind,
        }))
    }

    /// Returns the not-yet-parsed rest of the input data.
    pub fn remaining(&self) -> &'a [u8] {
        self.reader.remaining()
    }

    fn read_dqt(&mut self, reader: &mut Reader<'a>) -> Result<Dqt<'a>> {
        // The segment length tells us how many tables this DQT defines.
        // 16-bit table entries (Pq=1) are not supported and rejected later.
        let count = reader.remaining().len() / mem::size_of::<QuantizationTable>();
        if count * mem::size_of::<QuantizationTable>() != reader.remaining().len() {
            log::warn!(
                "DQT segment with {} bytes should have been a multiple of {}",
                reader.remaining().len(),
                mem::size_of::<QuantizationTable>(),
            );
        }
        Ok(Dqt(reader.read_objs(count)?))
    }

    fn read_dht(&mut self, reader: &mut Reader<'a>) -> Result<Dht<'a>> {
        // Tc+Th byte, 16 length counts, and at least one symbol.
        const MIN_DHT_LEN: usize = 18;

        // Some encoders pack several table definitions into one DHT segment,
        // so keep reading class/id bodies until the data runs out rather
        // than trusting the count implied by the first header.
        let mut tables = Vec::new();
        while reader.remaining().len() >= MIN_DHT_LEN {
            let header: &DhtHeader = reader.read_obj()?;
            let symbols = reader.read_slice(header.num_symbols())?;
            tables.push(DhtTable { header, symbols });
        }

        Ok(Dht { tables })
    }

    fn read_sof(&mut self, marker: u8, reader: &mut Reader<'a>) -> Result<Sof<'a>> {
        let precision = reader.read_u8()?;
        let height = reader.read_u16()?;
        let width = reader.read_u16()?;
        let num_components = reader.read_u8()?;
        let components = reader.read_objs::<FrameComponent>(num_components.into())?;
        Ok(Sof {
            marker: SofMarker(marker),
            precision,
            height,
            width,
            components,
        })
    }

    fn read_sos(&mut self, reader: &mut Reader<'a>) -> Result<Sos<'a>> {
        let num_components = reader.read_u8()?;
        let components = reader.read_objs(num_components.into())?;
        let spectral_start = reader.read_u8()?;
        let spectral_end = reader.read_u8()?;
        let approx = reader.read_u8()?;

        self.reader.position = reader.position;

        // The entropy-coded data follows immediately and may contain `RST`
        // markers and stuffed bytes. Find its extent by scanning for the
        // first real marker; the RST markers stay part of the scan data.
        let data_start = self.reader.position;
        loop {
            while self.reader.peek_u8(0)? != 0xff {
                self.reader.position += 1;
            }

            let mut offset = 1;
            let mut byte = self.reader.peek_u8(offset)?;
            while byte == 0xff {
                offset += 1;
                byte = self.reader.peek_u8(offset)?;
            }

            match byte {
                0x00 | 0xD0..=0xD7 => {
                    self.reader.position += offset + 1;
                }
                _ => {
                    self.reader.position += offset - 1;
                    break;
                }
            }
        }

        Ok(Sos {
            components,
            spectral_start,
            spectral_end,
            approx,
            data_offset: data_start,
            data: &self.reader.buf[data_start..self.reader.position],
        })
    }

    fn read_app(&mut self, marker: u8, reader: &mut Reader<'a>) -> Result<App> {
        let n = marker - 0xE0;

        let jfif = match n {
            0 => self.read_jfif(reader)?,
            _ => None,
        };

        // APP segments contain arbitrary vendor data; skip whatever we did
        // not understand without warning about it.
        reader.position = reader.buf.len();

        Ok(App { n, jfif })
    }

    fn read_jfif(&mut self, reader: &mut Reader<'a>) -> Result<Option<Jfif>> {
        const MAGIC: &[u8] = b"JFIF\0";

        if reader.read_slice(MAGIC.len()).ok() != Some(MAGIC) {
            return Ok(None); // APP0, but not a JFIF header.
        }

        let major_version = reader.read_u8()?;
        let minor_version = reader.read_u8()?;
        let unit = match reader.read_u8()? {
            0 => DensityUnit::None,
            1 => DensityUnit::DotsPerInch,
            2 => DensityUnit::DotsPerCm,
            e => {
                return Err(Error::structural(format!(
                    "JFIF header specifies invalid density unit {e}"
                )))
            }
        };
        let density_x = reader.read_u16()?;
        let density_y = reader.read_u16()?;
        // The thumbnail (if any) follows; it is irrelevant for decoding.
        Ok(Some(Jfif {
            major_version,
            minor_version,
            unit,
            density_x,
            density_y,
        }))
    }
}

#[derive(Debug)]
struct Reader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn eof() -> Error {
        Error::structural("reached end of data while decoding JPEG stream")
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.position..]
    }

    fn peek_u8(&self, offset: usize) -> Result<u8> {
        match self.buf.get(self.position + offset) {
            Some(&byte) => Ok(byte),
            None => Err(Self::eof()),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let res = self.peek_u8(0);
        if res.is_ok() {
            self.position += 1;
        }
        res
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = [self.read_u8()?, self.read_u8()?];
        Ok(u16::from_be_bytes(b))
    }

    fn read_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining().len() < count {
            Err(Self::eof())
        } else {
            let slice = &self.remaining()[..count];
            self.position += count;
            Ok(slice)
        }
    }

    fn read_obj<T: AnyBitPattern>(&mut self) -> Result<&'a T> {
        assert_eq!(mem::align_of::<T>(), 1);
        let bytes = self.read_slice(mem::size_of::<T>())?;
        Ok(bytemuck::from_bytes(bytes))
    }

    fn read_objs<T: AnyBitPattern>(&mut self, count: usize) -> Result<&'a [T]> {
        assert_eq!(mem::align_of::<T>(), 1);
        let bytes = self.read_slice(count * mem::size_of::<T>())?;
        Ok(bytemuck::cast_slice(bytes))
    }

    fn read_length(&mut self) -> Result<u16> {
        // The length parameter counts the segment parameters including
        // itself, but not the FF xx marker.
        let len = self.read_u16()?;
        if len < 2 {
            return Err(Error::structural(format!("invalid segment length {len}")));
        }
        if self.remaining().len() < (len - 2).into() {
            return Err(Self::eof());
        }
        Ok(len - 2)
    }
}

/// A segment of a JPEG file, introduced by a `0xFF 0xXX` marker.
#[derive(Debug)]
pub struct Segment<'a> {
    marker: u8,
    raw_bytes: &'a [u8],
    offset: usize,
    kind: Option<SegmentKind<'a>>,
}

impl<'a> Segment<'a> {
    /// Returns the offset of the segment's `0xFF 0xXX` marker in the input
    /// buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the marker byte (the `0xXX`) identifying the segment type.
    #[inline]
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The segment parameter bytes, excluding the marker and the length
    /// indication, and excluding any entropy-coded data following an SOS
    /// segment.
    #[inline]
    pub fn raw_bytes(&self) -> &[u8] {
        self.raw_bytes
    }

    #[inline]
    pub fn as_segment_kind(&self) -> Option<&SegmentKind<'a>> {
        self.kind.as_ref()
    }
}

/// Enumeration of segment kinds understood by this parser.
#[derive(Debug)]
#[non_exhaustive]
pub enum SegmentKind<'a> {
    Dqt(Dqt<'a>),
    Dht(Dht<'a>),
    Dri(Dri),
    Sof(Sof<'a>),
    Sos(Sos<'a>),
    App(App),
}

/// An application-specific segment (`APPn`).
#[derive(Debug)]
pub struct App {
    n: u8,
    jfif: Option<Jfif>,
}

impl App {
    /// Returns the type of APP marker (the `n` in `APPn`).
    #[inline]
    pub fn n(&self) -> u8 {
        self.n
    }

    /// Returns the decoded JFIF header, if this is an APP0 segment carrying
    /// one.
    #[inline]
    pub fn jfif(&self) -> Option<&Jfif> {
        self.jfif.as_ref()
    }
}

/// The JFIF identification header stored in APP0.
///
/// Purely informational; nothing in here affects the decode process.
#[derive(Debug, Clone, Copy)]
pub struct Jfif {
    pub major_version: u8,
    pub minor_version: u8,
    pub unit: DensityUnit,
    pub density_x: u16,
    pub density_y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DensityUnit {
    None,
    DotsPerInch,
    DotsPerCm,
}

#[derive(Copy, Clone, AnyBitPattern)]
#[repr(C)]
pub struct QuantizationTable {
    pq_tq: u8,
    values: [u8; 64],
}

impl QuantizationTable {
    /// Returns the element precision: 0 for 8-bit values, 1 for 16-bit
    /// values (which this decoder rejects).
    #[inline]
    pub fn precision(&self) -> u8 {
        self.pq_tq >> 4
    }

    /// Returns the destination identifier (0-3).
    #[inline]
    pub fn id(&self) -> u8 {
        self.pq_tq & 0xf
    }

    /// Returns the 64 table elements, in zig-zag order.
    #[inline]
    pub fn values(&self) -> &[u8; 64] {
        &self.values
    }
}

impl fmt::Debug for QuantizationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizationTable")
            .field("precision", &self.precision())
            .field("id", &self.id())
            .field("values", &self.values)
            .finish()
    }
}

/// **D**efine **Q**uantization **T**ables — carries one or more
/// [`QuantizationTable`]s.
#[derive(Debug)]
pub struct Dqt<'a>(&'a [QuantizationTable]);

impl<'a> Dqt<'a> {
    #[inline]
    pub fn tables(&self) -> impl Iterator<Item = &QuantizationTable> {
        self.0.iter()
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
struct DhtHeader {
    tc_th: u8,
    counts: [u8; 16],
}

impl DhtHeader {
    fn num_symbols(&self) -> usize {
        self.counts.iter().map(|&l| usize::from(l)).sum()
    }
}

/// One table definition inside a DHT segment.
pub struct DhtTable<'a> {
    header: &'a DhtHeader,
    symbols: &'a [u8],
}

impl<'a> DhtTable<'a> {
    /// Returns the table class (0 = DC, 1 = AC).
    #[inline]
    pub fn class(&self) -> u8 {
        self.header.tc_th >> 4
    }

    /// Returns the table destination identifier (0-3).
    #[inline]
    pub fn id(&self) -> u8 {
        self.header.tc_th & 0xf
    }

    /// Returns the number of codes of each length 1..=16.
    #[inline]
    pub fn counts(&self) -> &[u8; 16] {
        &self.header.counts
    }

    /// Returns the symbol values, in code order.
    #[inline]
    pub fn symbols(&self) -> &[u8] {
        self.symbols
    }
}

impl<'a> fmt::Debug for DhtTable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhtTable")
            .field("class", &self.class())
            .field("id", &self.id())
            .field("counts", &self.counts())
            .field("symbols", &self.symbols)
            .finish()
    }
}

/// **D**efine **H**uffman **T**ables — carries one or more [`DhtTable`]s.
#[derive(Debug)]
pub struct Dht<'a> {
    tables: Vec<DhtTable<'a>>,
}

impl<'a> Dht<'a> {
    pub fn tables(&self) -> impl Iterator<Item = &DhtTable<'a>> {
        self.tables.iter()
    }
}

/// **D**efine **R**estart **I**nterval — enables restart markers and sets
/// the number of MCUs between them.
#[derive(Debug, Clone, Copy)]
pub struct Dri {
    mcus: u16,
}

impl Dri {
    /// Returns the number of MCUs contained in each restart interval.
    #[inline]
    pub fn mcus(&self) -> u16 {
        self.mcus
    }
}

/// **S**tart **O**f **F**rame.
#[derive(Debug)]
pub struct Sof<'a> {
    marker: SofMarker,
    precision: u8,
    height: u16,
    width: u16,
    components: &'a [FrameComponent],
}

impl<'a> Sof<'a> {
    #[inline]
    pub fn marker(&self) -> SofMarker {
        self.marker
    }

    /// Returns the sample precision in bits.
    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Returns the number of lines in the frame.
    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the number of samples per line.
    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn components(&self) -> &'a [FrameComponent] {
        self.components
    }
}

/// The `SOFn` marker byte, identifying the coding process of the frame.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SofMarker(u8);

impl SofMarker {
    /// Baseline sequential DCT, the only process this decoder handles.
    pub const BASELINE: Self = Self(0xC0);

    /// Returns a human-readable name of the coding process.
    pub fn process(&self) -> &'static str {
        match self.0 {
            0xC0 => "baseline",
            0xC1 | 0xC9 => "extended sequential",
            0xC2 | 0xCA => "progressive",
            0xC3 | 0xCB => "lossless",
            _ => "differential/unknown",
        }
    }
}

impl fmt::Debug for SofMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SOF{}", self.0 - 0xC0)
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub struct FrameComponent {
    id: u8,
    sampling: u8,
    qtable: u8,
}

impl FrameComponent {
    /// Returns the component identifier the scan header refers back to.
    ///
    /// By widespread convention this is 1 for Y, 2 for Cb, and 3 for Cr
    /// (some encoders number from 0 instead); this decoder requires one of
    /// those two conventions.
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Returns the horizontal sampling factor (and the number of horizontal
    /// data units per MCU).
    #[inline]
    pub fn horizontal_sampling(&self) -> u8 {
        self.sampling >> 4
    }

    /// Returns the vertical sampling factor (and the number of vertical data
    /// units per MCU).
    #[inline]
    pub fn vertical_sampling(&self) -> u8 {
        self.sampling & 0xf
    }

    /// Returns the quantization table id (0-3) this component dequantizes
    /// with.
    #[inline]
    pub fn qtable(&self) -> u8 {
        self.qtable
    }
}

impl fmt::Debug for FrameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameComponent")
            .field("id", &self.id)
            .field("h", &self.horizontal_sampling())
            .field("v", &self.vertical_sampling())
            .field("qtable", &self.qtable)
            .finish()
    }
}

/// **S**tart **O**f **S**can — the scan header. The entropy-coded data
/// follows it immediately in the stream and is captured as [`Sos::data`].
pub struct Sos<'a> {
    components: &'a [ScanComponent],
    spectral_start: u8,
    spectral_end: u8,
    approx: u8,
    data_offset: usize,
    data: &'a [u8],
}

impl<'a> Sos<'a> {
    #[inline]
    pub fn components(&self) -> &[ScanComponent] {
        self.components
    }

    /// Start of the spectral selection; 0 for baseline scans.
    #[inline]
    pub fn spectral_start(&self) -> u8 {
        self.spectral_start
    }

    /// End of the spectral selection; 63 for baseline scans.
    #[inline]
    pub fn spectral_end(&self) -> u8 {
        self.spectral_end
    }

    /// Successive approximation bit positions; 0 for baseline scans.
    #[inline]
    pub fn approx(&self) -> u8 {
        self.approx
    }

    /// Returns the offset of the entropy-coded data in the input buffer.
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Returns the entropy-coded data, including any embedded `RST` markers.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> fmt::Debug for Sos<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sos")
            .field("components", &self.components)
            .field("spectral_start", &self.spectral_start)
            .field("spectral_end", &self.spectral_end)
            .field("approx", &self.approx)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub struct ScanComponent {
    selector: u8,
    tables: u8,
}

impl ScanComponent {
    /// Returns the id of the frame component this scan component selects.
    #[inline]
    pub fn selector(&self) -> u8 {
        self.selector
    }

    /// Returns the DC entropy table destination (0-3).
    #[inline]
    pub fn dc_table(&self) -> u8 {
        self.tables >> 4
    }

    /// Returns the AC entropy table destination (0-3).
    #[inline]
    pub fn ac_table(&self) -> u8 {
        self.tables & 0xf
    }
}

impl fmt::Debug for ScanComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanComponent")
            .field("selector", &self.selector)
            .field("dc_table", &self.dc_table())
            .field("ac_table", &self.ac_table())
            .finish()
    }
}
