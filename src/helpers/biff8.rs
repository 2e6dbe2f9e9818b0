//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for the Excel 97-2003 workbook stream, stitching CONTINUE records
//! back onto the record they extend.

use crate::error::SheetMapperError;
use crate::helpers::bytes::le_f64;
use crate::helpers::bytes::le_u16;
use crate::helpers::bytes::le_u32;
use crate::helpers::bytes::le_u8;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 0x003C;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NotEnoughDataError(usize),
}

/// Cursor over the records of a BIFF8 stream.
pub(crate) struct Biff8Reader {
    /// Code page for 8-bit strings, switched by the CODEPAGE record
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Position of the next record header
    next_record: usize,
    /// Byte ranges of the current record and its CONTINUE records
    segments: Vec<(usize, usize)>,
    segment: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(buffer: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer,
            next_record: 0,
            segments: Vec::new(),
            segment: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type, or `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SheetMapperError> {
        let Some(kind) = le_u16(&self.buffer, self.next_record) else {
            return Ok(None);
        };
        self.segments.clear();
        self.segment = 0;
        self.offset = 0;
        self.push_segment()?;
        while le_u16(&self.buffer, self.next_record) == Some(CONTINUE) {
            self.push_segment()?;
        }
        Ok(Some(kind))
    }

    fn push_segment(&mut self) -> Result<(), SheetMapperError> {
        let size = le_u16(&self.buffer, self.next_record + 2)
            .ok_or(Biff8Error::NotEnoughDataError(4))? as usize;
        let lower = self.next_record + 4;
        let upper = (lower + size).min(self.buffer.len());
        self.segments.push((lower, upper));
        self.next_record = lower + size;
        Ok(())
    }

    /// Moves the record cursor to an absolute stream position (a sheet's BOF).
    pub(crate) fn seek(&mut self, position: usize) {
        self.next_record = position;
        self.segments.clear();
    }

    /// Takes up to `length` bytes from the current segment, stepping over exhausted segments.
    fn take(&mut self, length: usize) -> &[u8] {
        while let Some((lower, upper)) = self.segments.get(self.segment) {
            if lower + self.offset < *upper {
                break;
            }
            self.segment += 1;
            self.offset = 0;
        }
        match self.segments.get(self.segment) {
            Some((lower, upper)) => {
                let source = lower + self.offset;
                let target = (*upper).min(source + length);
                self.offset += target - source;
                &self.buffer[source..target]
            }
            None => &[],
        }
    }

    fn take_exact(&mut self, length: usize) -> Result<&[u8], SheetMapperError> {
        let bytes = self.take(length);
        if bytes.len() == length {
            Ok(bytes)
        } else {
            Err(Biff8Error::NotEnoughDataError(length))?
        }
    }

    /// Skips `length` bytes, possibly spanning CONTINUE records.
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SheetMapperError> {
        let mut remaining = length;
        while remaining > 0 {
            let taken = self.take(remaining).len();
            if taken == 0 {
                Err(Biff8Error::NotEnoughDataError(remaining))?;
            }
            remaining -= taken;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SheetMapperError> {
        let bytes = self.take_exact(1)?;
        Ok(le_u8(bytes, 0).ok_or(Biff8Error::NotEnoughDataError(1))?)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, SheetMapperError> {
        let bytes = self.take_exact(2)?;
        Ok(le_u16(bytes, 0).ok_or(Biff8Error::NotEnoughDataError(2))?)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, SheetMapperError> {
        let bytes = self.take_exact(4)?;
        Ok(le_u32(bytes, 0).ok_or(Biff8Error::NotEnoughDataError(4))?)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, SheetMapperError> {
        let bytes = self.take_exact(8)?;
        Ok(le_f64(bytes, 0).ok_or(Biff8Error::NotEnoughDataError(8))?)
    }

    /// The last two bytes of the current record (MULRK keeps its last column there).
    pub(crate) fn trailing_u16(&self) -> Result<u16, SheetMapperError> {
        let (lower, upper) = self.segments.last().ok_or(Biff8Error::NotEnoughDataError(2))?;
        if upper - lower < 2 {
            Err(Biff8Error::NotEnoughDataError(2))?;
        }
        Ok(le_u16(&self.buffer, upper - 2).ok_or(Biff8Error::NotEnoughDataError(2))?)
    }

    /// Reads an RK number: a 30-bit integer or the high bits of a double, optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, SheetMapperError> {
        let rk = self.read_u32()?;
        let value = if rk & 0x02 != 0 {
            ((rk as i32) >> 2) as f64
        } else {
            f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
        };
        Ok(if rk & 0x01 != 0 { value / 100.0 } else { value })
    }

    /// ShortXLUnicodeString: 8-bit character count.
    pub(crate) fn read_short_string(&mut self) -> Result<String, SheetMapperError> {
        let count = self.read_u8()? as usize;
        let flags = self.read_u8()?;
        self.read_characters(count, flags)
    }

    /// XLUnicodeString: 16-bit character count.
    pub(crate) fn read_string(&mut self) -> Result<String, SheetMapperError> {
        let count = self.read_u16()? as usize;
        let flags = self.read_u8()?;
        self.read_characters(count, flags)
    }

    /// XLUnicodeRichExtendedString, as stored in the shared string table.
    /// Formatting runs and phonetic blocks follow the characters and are skipped.
    pub(crate) fn read_rich_string(&mut self) -> Result<String, SheetMapperError> {
        let count = self.read_u16()? as usize;
        let flags = self.read_u8()?;
        let runs = if flags & 0x08 != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic = if flags & 0x04 != 0 { self.read_u32()? as usize } else { 0 };
        let text = self.read_characters(count, flags)?;
        self.skip(4 * runs + phonetic)?;
        Ok(text)
    }

    /// Reads `count` characters; a CONTINUE boundary restarts with a fresh flags byte.
    fn read_characters(&mut self, count: usize, flags: u8) -> Result<String, SheetMapperError> {
        let mut text = String::new();
        let mut remaining = count;
        let mut wide = flags & 0x01 != 0;
        while remaining > 0 {
            if self.at_segment_end() {
                wide = self.read_u8()? & 0x01 != 0;
            }
            let wanted = if wide { remaining * 2 } else { remaining };
            let encoding = self.encoding;
            let bytes = self.take(wanted);
            if bytes.is_empty() {
                Err(Biff8Error::NotEnoughDataError(wanted))?;
            }
            let read = if wide {
                let (decoded, _) = UTF_16LE.decode_without_bom_handling(bytes);
                text.push_str(&decoded);
                bytes.len() / 2
            } else {
                if encoding == UTF_16LE {
                    text.extend(bytes.iter().map(|byte| char::from(*byte)));
                } else {
                    let (decoded, _) = encoding.decode_without_bom_handling(bytes);
                    text.push_str(&decoded);
                }
                bytes.len()
            };
            remaining -= read.clamp(1, remaining);
        }
        Ok(text)
    }

    /// True when the current segment is used up and a CONTINUE segment follows.
    fn at_segment_end(&self) -> bool {
        match self.segments.get(self.segment) {
            Some((lower, upper)) => lower + self.offset >= *upper && self.segment + 1 < self.segments.len(),
            None => false,
        }
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u16).to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn iterates_records() {
        let mut stream = record(0x0809, &[0, 6]);
        stream.extend(record(0x000A, &[]));
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x0809));
        assert_eq!(reader.read_u16().unwrap(), 0x0600);
        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn decodes_rk_numbers() {
        // integer 5, stored as 5 << 2 | 0b10
        let mut reader = Biff8Reader::new(record(0x027E, &((5u32 << 2) | 0x02).to_le_bytes()));
        reader.next().unwrap();
        assert_eq!(reader.read_rk_number().unwrap(), 5.0);

        // integer 150 divided by 100
        let mut reader = Biff8Reader::new(record(0x027E, &((150u32 << 2) | 0x03).to_le_bytes()));
        reader.next().unwrap();
        assert_eq!(reader.read_rk_number().unwrap(), 1.5);

        // double 2.5: high 30 bits of the IEEE representation
        let high = (2.5f64.to_bits() >> 32) as u32;
        let mut reader = Biff8Reader::new(record(0x027E, &high.to_le_bytes()));
        reader.next().unwrap();
        assert_eq!(reader.read_rk_number().unwrap(), 2.5);
    }

    #[test]
    fn reads_compressed_and_wide_strings() {
        let mut body = vec![3, 0, 0];
        body.extend_from_slice(b"abc");
        body.extend_from_slice(&[2, 0, 1]);
        body.extend("çã".encode_utf16().flat_map(|unit| unit.to_le_bytes()));
        let mut reader = Biff8Reader::new(record(0x0204, &body));
        reader.next().unwrap();
        assert_eq!(reader.read_string().unwrap(), "abc");
        assert_eq!(reader.read_string().unwrap(), "çã");
    }

    #[test]
    fn string_continues_across_records() {
        // 4 chars: "ab" in the SST record, "cd" in the CONTINUE record with a new flags byte
        let mut stream = record(0x00FC, &[4, 0, 0, b'a', b'b']);
        stream.extend(record(CONTINUE, &[0, b'c', b'd']));
        let mut reader = Biff8Reader::new(stream);
        reader.next().unwrap();
        assert_eq!(reader.read_rich_string().unwrap(), "abcd");
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn trailing_u16_reads_record_tail() {
        let mut reader = Biff8Reader::new(record(0x00BD, &[1, 0, 2, 0, 9, 0]));
        reader.next().unwrap();
        assert_eq!(reader.trailing_u16().unwrap(), 9);
    }

    #[test]
    fn short_records_fail() {
        let mut reader = Biff8Reader::new(record(0x0203, &[1]));
        reader.next().unwrap();
        assert!(reader.read_u16().is_err());
    }
}
