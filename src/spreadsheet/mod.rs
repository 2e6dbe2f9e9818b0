//! Workbook readers for Excel 2007+ (`.xlsx`, `.xlsm`) and Excel 97-2003 (`.xls`),
//! plus the single-sheet writer used for the master workbook.
//! Each reader yields one worksheet as a `Sheet` of typed cells.

pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod excel;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;
pub(crate) mod xlsx_writer;

use crate::error::SheetMapperError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use thiserror::Error;

/// Errors raised while opening or reading a workbook
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Missing part '{0}' in workbook")]
    FileError(String),

    #[error("Workbook '{0}' is password protected")]
    PasswordProtectedError(String),

    #[error("Workbook '{0}' has no worksheets")]
    EmptyError(String),

    #[error("No worksheet in '{0}' matches the sheet name pattern")]
    SheetNotFoundError(String),

    #[error("Invalid value '{3}' at {1}!{2} in '{0}'")]
    CellValueError(String, String, String, String),

    #[error("Worksheet {1} in '{0}' spans {2} rows by {3} columns, more cells than can be laid out")]
    RangeTooLargeError(String, String, usize, usize),
}

/// A workbook that can hand out one of its worksheets.
pub(crate) trait Spreadsheet {
    /// Returns the file name of this spreadsheet
    fn name(&self) -> String;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the first worksheet accepted by `criteria`.
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<Sheet, SheetMapperError>;
}

/// Workbook file extensions, lower case
pub(crate) const XLSX_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];
pub(crate) const XLS_EXTENSIONS: [&str; 1] = ["xls"];

/// Opens a workbook by its (lower-case) extension. `None` when the extension is not a workbook format.
pub(crate) fn open_spreadsheet(file_name: &str, extension: &str) -> Result<Option<Box<dyn Spreadsheet>>, SheetMapperError> {
    let spreadsheet: Box<dyn Spreadsheet> = if XLSX_EXTENSIONS.contains(&extension) {
        Box::new(XlsxSpreadsheet::open(file_name)?)
    } else if XLS_EXTENSIONS.contains(&extension) {
        Box::new(XlsSpreadsheet::open(file_name)?)
    } else {
        return Ok(None);
    };
    Ok(Some(spreadsheet))
}
