//! Bit-level access to the entropy-coded scan data.
//!
//! The scan data is a big-endian bit stream with two in-band escape rules:
//! a data byte of `0xFF` is always followed by a stuffed `0x00`, and `RST`
//! markers (`FF D0`..`FF D7`) may be embedded for resynchronization. Both are
//! removed transparently here; resetting the DC predictors at a restart
//! boundary is the caller's job (driven by its MCU counter, not by marker
//! detection).

use crate::error::{Error, Result};

pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    /// Current data byte. Bits are consumed MSB-first.
    byte: u8,
    /// Index of the next bit to read; 8 means `byte` is exhausted.
    bit: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            byte: 0,
            bit: 8,
        }
    }

    /// Reads a single bit (0 or 1) from the stream.
    pub fn read_bit(&mut self) -> Result<u8> {
        if self.bit == 8 {
            self.advance()?;
        }
        let bit = (self.byte >> (7 - self.bit)) & 1;
        self.bit += 1;
        Ok(bit)
    }

    /// Discards the remaining bits of the current byte.
    ///
    /// The next [`BitReader::read_bit`] call will pull a fresh byte, consuming
    /// any `RST` marker in front of it.
    pub fn align(&mut self) {
        self.bit = 8;
    }

    fn advance(&mut self) -> Result<()> {
        let mut byte = self.next_raw()?;
        while byte == 0xff {
            match self.next_raw()? {
                0x00 => {
                    // Byte stuffing; the 0xFF itself is scan data.
                    byte = 0xff;
                    break;
                }
                0xD0..=0xD7 => {
                    // RST markers carry no payload, skip to the byte after.
                    byte = self.next_raw()?;
                }
                inv => {
                    return Err(Error::structural(format!(
                        "invalid marker 0x{inv:02x} found in scan data"
                    )));
                }
            }
        }
        self.byte = byte;
        self.bit = 0;
        Ok(())
    }

    fn next_raw(&mut self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(&b) => {
                self.position += 1;
                Ok(b)
            }
            None => Err(Error::structural(
                "reached end of data while decoding JPEG stream",
            )),
        }
    }
}
