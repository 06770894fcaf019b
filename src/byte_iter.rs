//! Byte-level cursor shared by every score-format parser in [`crate::formats`].
//!
//! Score files are loaded fully into memory before parsing; file I/O
//! itself is the host's responsibility. The cursor works directly off a
//! borrowed `&[u8]` rather than a `std::io::Read` stream. That lets the
//! format dispatcher in `formats::sniff` peek at the first bytes, decide on
//! a format, and then hand the *same* cursor (rewound) to the chosen parser
//! without re-reading anything.

use crate::core::vlq::{decode_slice, VlqError, CONTINUE};
use log::trace;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::str::{from_utf8, Utf8Error};

pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
    limit: Option<usize>,
}

#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub(crate) enum ByteError {
    #[snafu(display("unexpected end of data around byte {}", position))]
    End { position: usize },

    #[snafu(display(
        "expected string but found non-utf8 encoded bytes around {}: {}",
        position,
        source
    ))]
    Str { position: usize, source: Utf8Error },

    #[snafu(display(
        "expected tag '{}' but found '{}' near position {}",
        expected,
        found,
        position
    ))]
    Tag {
        expected: String,
        found: String,
        position: usize,
    },

    #[snafu(display("too many bytes while reading vlq around {}", position))]
    VlqTooBig { position: usize },

    #[snafu(display("problem decoding vlq around {}: {}", position, source))]
    VlqDecode { position: usize, source: VlqError },

    #[snafu(display(
        "incorrect byte value around {}: expected '{:#X}', found '{:#X}'",
        position,
        expected,
        found,
    ))]
    ReadExpect {
        expected: u8,
        found: u8,
        position: usize,
    },
}

pub(crate) type ByteResult<T> = std::result::Result<T, ByteError>;

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            limit: None,
        }
    }

    /// Current byte offset from the start of the buffer.
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    /// Jump the cursor to an absolute offset (used by loop/branch position
    /// tables and by re-entrant parsers like RMI -> SMF and XMI's per-song
    /// re-entry into the SMF parser).
    pub(crate) fn seek_to(&mut self, position: usize) {
        self.position = position;
    }

    fn end(&self) -> usize {
        match self.limit {
            Some(limit) => limit.min(self.bytes.len()),
            None => self.bytes.len(),
        }
    }

    pub(crate) fn is_end(&self) -> bool {
        self.position >= self.end()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.end().saturating_sub(self.position)
    }

    pub(crate) fn read(&mut self) -> ByteResult<Option<u8>> {
        if self.is_end() {
            return Ok(None);
        }
        let b = self.bytes[self.position];
        self.position += 1;
        trace!("read {:#x} at position {}", b, self.position - 1);
        Ok(Some(b))
    }

    pub(crate) fn read_or_die(&mut self) -> ByteResult<u8> {
        self.read()?.context(End {
            position: self.position,
        })
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        if self.position < self.end() {
            Some(self.bytes[self.position])
        } else {
            None
        }
    }

    pub(crate) fn peek_n(&self, offset: usize) -> Option<u8> {
        let idx = self.position + offset;
        if idx < self.end() {
            Some(self.bytes[idx])
        } else {
            None
        }
    }

    pub(crate) fn peek_or_die(&self) -> ByteResult<u8> {
        self.peek().context(End {
            position: self.position,
        })
    }

    pub(crate) fn read2(&mut self) -> ByteResult<[u8; 2]> {
        Ok([self.read_or_die()?, self.read_or_die()?])
    }

    pub(crate) fn read4(&mut self) -> ByteResult<[u8; 4]> {
        Ok([
            self.read_or_die()?,
            self.read_or_die()?,
            self.read_or_die()?,
            self.read_or_die()?,
        ])
    }

    pub(crate) fn read_u16(&mut self) -> ByteResult<u16> {
        Ok(u16::from_be_bytes(self.read2()?))
    }

    pub(crate) fn read_u16_le(&mut self) -> ByteResult<u16> {
        Ok(u16::from_le_bytes(self.read2()?))
    }

    pub(crate) fn read_u32(&mut self) -> ByteResult<u32> {
        Ok(u32::from_be_bytes(self.read4()?))
    }

    pub(crate) fn read_u32_le(&mut self) -> ByteResult<u32> {
        Ok(u32::from_le_bytes(self.read4()?))
    }

    pub(crate) fn read_n(&mut self, num_bytes: usize) -> ByteResult<Vec<u8>> {
        let mut out = Vec::with_capacity(num_bytes);
        for _ in 0..num_bytes {
            out.push(self.read_or_die()?);
        }
        Ok(out)
    }

    /// Standard MIDI-file variable length quantity: big-endian, 7 bits per
    /// byte, continuation in the high bit.
    pub(crate) fn read_vlq_u32(&mut self) -> ByteResult<u32> {
        let mut raw = Vec::new();
        let mut current_byte = CONTINUE;
        let mut byte_count = 0u8;
        while current_byte & CONTINUE == CONTINUE {
            ensure!(
                byte_count <= 4,
                VlqTooBig {
                    position: self.position
                }
            );
            current_byte = self.read_or_die()?;
            raw.push(current_byte);
            byte_count += 1;
        }
        let decoded = decode_slice(&raw).context(VlqDecode {
            position: self.position,
        })?;
        Ok(decoded)
    }

    /// HMP's variable length quantity: little-endian 7-bit groups, MSB of
    /// the *last* byte set rather than every-but-last.
    pub(crate) fn read_hmp_vlq(&mut self) -> ByteResult<u32> {
        let mut result: u32 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_or_die()?;
            result |= ((b & 0x7f) as u32) << shift;
            if b & 0x80 != 0 {
                break;
            }
            shift += 7;
            ensure!(
                shift <= 28,
                VlqTooBig {
                    position: self.position
                }
            );
        }
        Ok(result)
    }

    pub(crate) fn expect_tag(&mut self, expected_tag: &str) -> ByteResult<()> {
        let tag_bytes = self.read4()?;
        let actual_tag = from_utf8(&tag_bytes).context(Str {
            position: self.position,
        })?;
        ensure!(
            expected_tag == actual_tag,
            Tag {
                expected: expected_tag,
                found: actual_tag,
                position: self.position,
            }
        );
        Ok(())
    }

    pub(crate) fn is_tag_here(&self, expected_tag: &str) -> bool {
        let bytes = expected_tag.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            match self.peek_n(i) {
                Some(actual) if actual == *b => continue,
                _ => return false,
            }
        }
        true
    }

    pub(crate) fn read_expect(&mut self, expected: u8) -> ByteResult<()> {
        let found = self.read_or_die()?;
        ensure!(
            expected == found,
            ReadExpect {
                expected,
                found,
                position: self.position,
            }
        );
        Ok(())
    }

    pub(crate) fn set_size_limit(&mut self, size: usize) {
        self.limit = Some(self.position + size)
    }

    pub(crate) fn clear_size_limit(&mut self) {
        self.limit = None
    }

    pub(crate) fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_reads() {
        let bytes = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x10, 0x20, 0x30, 0x40];
        let mut c = ByteCursor::new(&bytes);
        assert_eq!(0x00, c.read().unwrap().unwrap());
        assert_eq!(Some(0x01), c.peek());
        assert_eq!([0x01, 0x02], c.read2().unwrap());
        c.set_size_limit(2);
        assert!(!c.is_end());
        assert_eq!(0x03, c.read().unwrap().unwrap());
        assert_eq!(0x04, c.read().unwrap().unwrap());
        assert!(c.is_end());
        c.clear_size_limit();
        assert_eq!(0x10, c.read().unwrap().unwrap());
    }

    #[test]
    fn tag_matching() {
        let bytes = b"MThd\x00\x00\x00\x06";
        let mut c = ByteCursor::new(bytes);
        assert!(c.is_tag_here("MThd"));
        c.expect_tag("MThd").unwrap();
        assert_eq!(6, c.read_u32().unwrap());
    }

    #[test]
    fn hmp_vlq_roundtrip() {
        // 300 = 0b1_0010_1100 -> low7 = 0b010_1100 (0x2c), remaining = 0b10 (0x02)
        let bytes = [0x2c, 0x82];
        let mut c = ByteCursor::new(&bytes);
        assert_eq!(300, c.read_hmp_vlq().unwrap());
    }
}
