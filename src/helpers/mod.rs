//! Low-level readers shared by the workbook formats: byte decoding, OLE compound files,
//! BIFF8 records, XML events and ZIP entries.

pub(crate) mod biff8;
pub(crate) mod bytes;
pub(crate) mod cfb;
pub(crate) mod xml;
pub(crate) mod zip;
