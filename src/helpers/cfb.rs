//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) workbooks.
//! Only what is needed to pull a named stream (`Workbook` / `Book`) out of the container.

use crate::error::SheetMapperError;
use crate::helpers::bytes::le_u16;
use crate::helpers::bytes::le_u32;
use crate::helpers::bytes::le_u32_words;
use crate::helpers::bytes::le_u64;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

/// Sector ids at or above this value are markers (free, end of chain, FAT, DIFAT).
const MAX_REGULAR_SECTOR: u32 = 0xFFFF_FFFA;
const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
const ROOT_ENTRY: &str = "Root Entry";

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector chain starting at '{0}' is broken or cyclic")]
    SectorChainError(u32),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// Parsed compound file: the stream directory plus both allocation tables.
pub(crate) struct Cfb {
    streams: HashMap<String, StreamEntry>,
    fat: Vec<u32>,
    sectors: Sectors,
    mini_fat: Vec<u32>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Loads the whole container into memory and indexes its directory.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, SheetMapperError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;

        let header = Header::parse(&data)?;
        let sector_size = header.sector_size()?;
        let sectors = Sectors { data, size: sector_size, base: sector_size };
        let fat = load_fat(&sectors, &header)?;

        let directory = read_chain(&fat, &sectors, header.first_directory_sector)?;
        let streams: HashMap<String, StreamEntry> = directory
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .filter_map(|bytes| StreamEntry::parse(bytes, header.major_version))
            .collect();
        if streams.is_empty() {
            Err(CfbError::RootDirectoryError)?;
        }

        let mini_fat = if header.mini_fat_sector_count > 0 {
            le_u32_words(&read_chain(&fat, &sectors, header.first_mini_fat_sector)?).collect()
        } else {
            Vec::new()
        };
        let mini_data = match streams.get(ROOT_ENTRY) {
            Some(root) => {
                let mut bytes = read_chain(&fat, &sectors, root.start)?;
                bytes.truncate(root.size);
                bytes
            }
            None => Vec::new(),
        };
        let mini_sectors = Sectors { data: mini_data, size: MINI_SECTOR_SIZE, base: 0 };

        Ok(Cfb { streams, fat, sectors, mini_fat, mini_sectors })
    }

    /// Checks if a stream exists in the container
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    /// Reads a whole stream, or `None` when the container has no stream with that name.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SheetMapperError> {
        let Some(entry) = self.streams.get(name) else {
            return Ok(None);
        };
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_fat, &self.mini_sectors, entry.start)?
        } else {
            read_chain(&self.fat, &self.sectors, entry.start)?
        };
        bytes.truncate(entry.size);
        Ok(Some(bytes))
    }
}

/// Builds the FAT from the header's DIFAT entries plus any chained DIFAT sectors.
fn load_fat(sectors: &Sectors, header: &Header) -> Result<Vec<u32>, SheetMapperError> {
    let mut fat_sectors: Vec<u32> = le_u32_words(&sectors.data[76..HEADER_SIZE]).collect();

    let mut next = header.first_difat_sector;
    let mut visited = 0usize;
    while next < MAX_REGULAR_SECTOR {
        if visited > sectors.count() {
            Err(CfbError::SectorChainError(header.first_difat_sector))?;
        }
        let mut words: Vec<u32> = le_u32_words(sectors.get(next)?).collect();
        next = words.pop().ok_or(CfbError::FileFormatError)?;
        fat_sectors.extend(words);
        visited += 1;
    }

    let mut fat = Vec::new();
    for sector in fat_sectors.into_iter().filter(|id| *id < MAX_REGULAR_SECTOR) {
        fat.extend(le_u32_words(sectors.get(sector)?));
    }
    Ok(fat)
}

/// Concatenates the sectors of a chain, guarding against cycles in corrupt files.
fn read_chain(table: &[u32], sectors: &Sectors, start: u32) -> Result<Vec<u8>, SheetMapperError> {
    let mut content = Vec::new();
    let mut index = start;
    let mut steps = 0usize;
    while index < MAX_REGULAR_SECTOR {
        if steps > table.len() {
            Err(CfbError::SectorChainError(start))?;
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *table.get(index as usize).ok_or(CfbError::SectorChainError(start))?;
        steps += 1;
    }
    Ok(content)
}

/// Fixed-size sectors laid out after `base` bytes of `data`.
struct Sectors {
    data: Vec<u8>,
    size: usize,
    base: usize,
}

impl Sectors {
    fn count(&self) -> usize {
        self.data.len().saturating_sub(self.base) / self.size + 1
    }

    fn get(&self, index: u32) -> Result<&[u8], CfbError> {
        let lower = self.base + index as usize * self.size;
        let upper = self.data.len().min(lower + self.size);
        if lower >= upper {
            return Err(CfbError::FileFormatError);
        }
        Ok(&self.data[lower..upper])
    }
}

/// The fields of the 512-byte header this reader relies on
#[derive(Debug)]
struct Header {
    major_version: u16,
    sector_shift: u16,
    first_directory_sector: u32,
    first_mini_fat_sector: u32,
    mini_fat_sector_count: u32,
    first_difat_sector: u32,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self, CfbError> {
        if le_u64(data, 0) != Some(SIGNATURE) {
            return Err(CfbError::OleSignatureError);
        }
        let field = |offset| le_u32(data, offset).ok_or(CfbError::FileFormatError);
        Ok(Header {
            major_version: le_u16(data, 26).ok_or(CfbError::FileFormatError)?,
            sector_shift: le_u16(data, 30).ok_or(CfbError::FileFormatError)?,
            first_directory_sector: field(48)?,
            first_mini_fat_sector: field(60)?,
            mini_fat_sector_count: field(64)?,
            first_difat_sector: field(68)?,
        })
    }

    fn sector_size(&self) -> Result<usize, CfbError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            (4, 12) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift)),
        }
    }
}

/// Directory entry locating one stream
#[derive(Debug)]
struct StreamEntry {
    start: u32,
    size: usize,
}

impl StreamEntry {
    /// Returns `None` for unused directory slots.
    fn parse(bytes: &[u8], major_version: u16) -> Option<(String, StreamEntry)> {
        let name_size = (le_u16(bytes, 64)? as usize).min(64);
        if name_size == 0 {
            return None;
        }
        let (name, _, _) = UTF_16LE.decode(&bytes[..name_size]);
        let name = name.split('\0').next().unwrap_or_default().to_owned();

        let start = le_u32(bytes, 116)?;
        // Version 3 files may leave garbage in the high half of the size.
        let size = if major_version == 3 {
            le_u32(bytes, 120)? as usize
        } else {
            le_u64(bytes, 120)? as usize
        };
        Some((name, StreamEntry { start, size }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_short_input() {
        let mut reader = Cursor::new(vec![0u8; 100]);
        let error = Cfb::new(&mut reader).err().unwrap();
        assert!(matches!(error, SheetMapperError::CfbHelperError(CfbError::FileFormatError)));
    }

    #[test]
    fn rejects_missing_signature() {
        let mut reader = Cursor::new(vec![0u8; 1024]);
        let error = Cfb::new(&mut reader).err().unwrap();
        assert!(matches!(error, SheetMapperError::CfbHelperError(CfbError::OleSignatureError)));
    }

    #[test]
    fn sector_size_by_version() {
        let header = Header {
            major_version: 4,
            sector_shift: 12,
            first_directory_sector: 0,
            first_mini_fat_sector: 0,
            mini_fat_sector_count: 0,
            first_difat_sector: 0,
        };
        assert_eq!(header.sector_size().unwrap(), 4096);
        let header = Header { sector_shift: 9, ..header };
        assert!(matches!(header.sector_size(), Err(CfbError::SectorSizeError(4, 9))));
    }

    #[test]
    fn parses_directory_entry() {
        let mut bytes = vec![0u8; DIRECTORY_ENTRY_SIZE];
        let name: Vec<u8> = "Book\0".encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
        bytes[..name.len()].copy_from_slice(&name);
        bytes[64..66].copy_from_slice(&(name.len() as u16).to_le_bytes());
        bytes[116..120].copy_from_slice(&7u32.to_le_bytes());
        bytes[120..124].copy_from_slice(&5000u32.to_le_bytes());
        bytes[124..128].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        let (name, entry) = StreamEntry::parse(&bytes, 3).unwrap();
        assert_eq!(name, "Book");
        assert_eq!(entry.start, 7);
        assert_eq!(entry.size, 5000);
    }

    #[test]
    fn read_chain_detects_cycles() {
        let sectors = Sectors { data: vec![0u8; 64 * 2], size: 64, base: 0 };
        let table = vec![1, 0];
        let error = read_chain(&table, &sectors, 0).unwrap_err();
        assert!(matches!(error, SheetMapperError::CfbHelperError(CfbError::SectorChainError(0))));
    }
}
