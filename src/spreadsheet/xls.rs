use crate::error::ResultOptionChain;
use crate::error::SheetMapperError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use thiserror::Error;

// BIFF8 record type identifiers
const FORMULA: u16 = 0x0006;
const EOF: u16 = 0x000A;
const DATE1904: u16 = 0x0022;
const FILE_PASS: u16 = 0x002F;
const CODE_PAGE: u16 = 0x0042;
const BOUND_SHEET8: u16 = 0x0085;
const MUL_RK: u16 = 0x00BD;
const XF: u16 = 0x00E0;
const SST: u16 = 0x00FC;
const LABEL_SST: u16 = 0x00FD;
const NUMBER: u16 = 0x0203;
const LABEL: u16 = 0x0204;
const BOOL_ERR: u16 = 0x0205;
const STRING: u16 = 0x0207;
const RK: u16 = 0x027E;
const FORMAT: u16 = 0x041E;
const BOF: u16 = 0x0809;
// Records that may sit between a FORMULA and its STRING result
const ARRAY: u16 = 0x0221;
const TABLE: u16 = 0x0236;
const SHR_FMLA: u16 = 0x04BC;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0:#018x}'")]
    FormulaValueError(u64),
}

/// An Excel 97-2003 workbook (`.xls`)
pub(crate) struct XlsSpreadsheet {
    pub(crate) name: String,
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell type for each XF index
    number_formats: Vec<CellType>,
    /// Worksheets with the stream position of their BOF record
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Opens the compound file and reads the workbook globals substream.
    pub(crate) fn open(file_name: &str) -> Result<XlsSpreadsheet, SheetMapperError> {
        let mut buf_reader = BufReader::new(File::open(file_name)?);
        let cfb = Cfb::new(&mut buf_reader)?;
        let mut reader = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::EmptyError(file_name.to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::PasswordProtectedError(file_name.to_owned()))?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let position = reader.read_u32()? as usize;
                reader.skip(1)?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_string()?;
                // Chart, macro and VBA sheets carry no cell grid
                if sheet_type == 0 {
                    sheets.push((sheet_name, position));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyError(file_name.to_owned()))?
        }

        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);

        Ok(XlsSpreadsheet {
            name: file_name.to_owned(),
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn cell_type(&self, either: Either<CellType, usize>) -> CellType {
        match either {
            Either::Left(kind) => kind,
            Either::Right(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
        }
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Reads the cell records of the first worksheet accepted by the criteria.
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<Sheet, SheetMapperError> {
        let (sheet_name, position) = self.sheets
            .iter()
            .find(|(sheet_name, _)| criteria.accept(sheet_name))
            .cloned()
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned()))?;

        self.reader.seek(position);
        self.reader.next()?;
        let mut sheet = Sheet::new(&self.name, &sheet_name, criteria.rows_limit);
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.trailing_u16()? as usize;
                    if sheet.after_row_limit(row) {
                        break;
                    }
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?.to_string();
                        let kind = self.cell_type(Either::Right(index));
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    if sheet.after_row_limit(row) {
                        break;
                    }
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let mut kind = self.cell_type(either);
                    let value = if kind == CellType::SharedString {
                        kind = CellType::Text;
                        let index = value.parse::<usize>()?;
                        self.shared_strings.get(index).cloned().ok_or_else(|| {
                            SpreadsheetError::CellValueError(
                                sheet.file_name.to_owned(),
                                sheet.name.to_owned(),
                                index_to_reference(row, col),
                                value.to_owned(),
                            )
                        })?
                    } else {
                        value
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        Ok(sheet)
    }
}

/// Reads the shared string table; strings may continue across CONTINUE records.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SheetMapperError> {
    reader.skip(4)?;
    let count = reader.read_u32()? as usize;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        shared_strings.push(reader.read_rich_string()?);
    }
    Ok(shared_strings)
}

/// BOOL_ERR: a boolean or an error code, told apart by a flag byte.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetMapperError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetMapperError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetMapperError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

/// LABEL_SST: the value is an index into the shared string table.
fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetMapperError> {
    reader.skip(2)?;
    let value = reader.read_u32()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetMapperError> {
    reader.skip(2)?;
    let value = reader.read_string()?;
    Ok((Either::Left(CellType::Text), value))
}

/// FORMULA: the cached result is a double unless the top two bytes are `0xFFFF`,
/// in which case the low byte selects string, boolean, error or empty string.
/// String results live in the following STRING record.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetMapperError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_f64()?.to_bits();
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        loop {
            match reader.next()? {
                Some(STRING) => return Ok((Either::Left(CellType::Text), reader.read_string()?)),
                Some(SHR_FMLA | ARRAY | TABLE) => continue,
                _ => return Err(XlsError::FormulaValueError(formula).into()),
            }
        }
    } else if flag == 1 {
        let value = if (formula & 0xFF_0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
    } else if flag == 3 {
        Ok((Either::Left(CellType::Text), String::new()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}
