//! In-memory text tables and the reader that loads them from delimited files and workbooks.

use crate::error::SheetMapperError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::open_spreadsheet;
use csv::QuoteStyle;
use csv::ReaderBuilder;
use csv::WriterBuilder;
use encoding_rs::Encoding;
use glob::Pattern;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Default column delimiter for delimited input and collaborator text
pub const DEFAULT_DELIMITER: char = ';';
/// Default text encoding label: UTF-8 with an optional byte-order mark
pub const DEFAULT_ENCODING: &str = "utf-8-sig";

/// Options for loading a `Table`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Field delimiter for `.csv` files (must be ASCII)
    pub delimiter: char,
    /// Encoding label for `.csv` files, as understood by the WHATWG Encoding Standard,
    /// plus `utf-8-sig`
    pub encoding: String,
    /// Row holding the column names; `None` reads every row as data
    pub header_row: Option<usize>,
    /// Glob pattern selecting the worksheet to read; the first sheet when absent
    pub sheet_name_pattern: Option<String>,
    /// Maximum number of rows to read
    pub rows_limit: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            encoding: DEFAULT_ENCODING.to_owned(),
            header_row: None,
            sheet_name_pattern: None,
            rows_limit: None,
        }
    }
}

impl ReadOptions {
    pub fn with_header_row(mut self, header_row: Option<usize>) -> Self {
        self.header_row = header_row;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = encoding.to_owned();
        self
    }

    fn criteria(&self) -> Result<Criteria, SheetMapperError> {
        let sheet_name_pattern = self.sheet_name_pattern
            .as_deref()
            .map(Pattern::new)
            .transpose()?;
        Ok(Criteria {
            sheet_name_pattern,
            rows_limit: self.rows_limit,
        })
    }
}

/// A rectangular table of text cells.
///
/// Every row has exactly as many cells as there are columns. Tables read without a
/// header row are labelled `0`, `1`, `2`, … so their columns are still addressable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    has_header: bool,
    sheet_name: Option<String>,
}

impl Table {
    /// Creates a table with named columns. Short rows are padded, long rows get `Unnamed: <i>` columns.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Table {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(columns.len());
        let mut columns = columns;
        columns.resize(width, String::new());
        let mut table = Table {
            columns: unique_column_names(&columns),
            rows,
            has_header: true,
            sheet_name: None,
        };
        table.pad_rows();
        table
    }

    /// Creates a header-less table whose columns are labelled by position.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Table {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut table = Table {
            columns: (0..width).map(|index| index.to_string()).collect(),
            rows,
            has_header: false,
            sheet_name: None,
        };
        table.pad_rows();
        table
    }

    /// Loads a `.csv`, `.xlsx`, `.xlsm` or `.xls` file.
    ///
    /// Fails with `FileNotFound` when the path does not exist, `UnsupportedFormat` for any
    /// other extension, and `Parse` when the content cannot be read as a table.
    pub fn load(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Table, SheetMapperError> {
        let path = path.as_ref();
        let file_name = path.to_string_lossy().to_string();
        if !path.is_file() {
            return Err(SheetMapperError::FileNotFound(file_name));
        }
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let (rows, sheet_name) = if extension == "csv" {
            let bytes = std::fs::read(path)?;
            let rows = read_delimited(&file_name, &bytes, options)?;
            (rows, None)
        } else {
            let criteria = options.criteria()?;
            let sheet = open_spreadsheet(&file_name, &extension)
                .and_then(|spreadsheet| {
                    spreadsheet
                        .map(|mut it| {
                            debug!(workbook = %it.name(), sheets = ?it.sheet_names(), "opened workbook");
                            it.read_sheet(&criteria)
                        })
                        .transpose()
                })
                .map_err(|error| as_parse_error(&file_name, error))?
                .ok_or_else(|| SheetMapperError::UnsupportedFormat {
                    file_name: file_name.to_owned(),
                    extension: extension.to_owned(),
                })?;
            let sheet_name = sheet.name.to_owned();
            let rows = sheet
                .into_rows()
                .map_err(|error| as_parse_error(&file_name, error.into()))?;
            (rows, Some(sheet_name))
        };
        debug!(file_name = %file_name, rows = rows.len(), "loaded table");

        let table = Table::from_rows(rows);
        let mut table = match options.header_row {
            Some(index) => table.with_header(index)?,
            None => table,
        };
        table.sheet_name = sheet_name;
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Number of data rows (the header row is not counted)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Worksheet the table was read from, `None` for delimited files
    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet_name.as_deref()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Cell at `row` in the column named `column`
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Re-reads the table with row `index` as the column-name row.
    /// Rows above it are dropped; the header row itself is not data.
    pub fn with_header(&self, index: usize) -> Result<Table, SheetMapperError> {
        let header = self.rows
            .get(index)
            .ok_or_else(|| SheetMapperError::RowNotFound(format!("header row {index} of {} rows", self.rows.len())))?;
        let table = Table::new(header.to_owned(), self.rows[index + 1..].to_vec());
        Ok(Table { sheet_name: self.sheet_name.to_owned(), ..table })
    }

    /// Renders up to `limit` data rows as delimited text, preceded by the column names when
    /// the table has a header. Every field is double-quoted when `quote_all` is set.
    pub fn to_delimited(&self, limit: Option<usize>, delimiter: char, quote_all: bool) -> Result<String, SheetMapperError> {
        let quote_style = if quote_all { QuoteStyle::Always } else { QuoteStyle::Necessary };
        let mut writer = WriterBuilder::new()
            .delimiter(ascii_delimiter(delimiter)?)
            .quote_style(quote_style)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        if self.has_header {
            writer.write_record(&self.columns)?;
        }
        for row in self.rows.iter().take(limit.unwrap_or(usize::MAX)) {
            writer.write_record(row)?;
        }
        let bytes = writer.into_inner().map_err(|error| error.into_error())?;
        Ok(String::from_utf8(bytes).map_err(|error| error.utf8_error())?)
    }

    fn pad_rows(&mut self) {
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }
}

/// Names empty columns `Unnamed: <i>` and suffixes repeated names with `.1`, `.2`, …
fn unique_column_names(columns: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let base = if column.trim().is_empty() {
            format!("Unnamed: {index}")
        } else {
            column.to_owned()
        };
        let mut name = base.to_owned();
        if let Some(&previous) = seen.get(&base) {
            let mut count = previous;
            loop {
                count += 1;
                name = format!("{base}.{count}");
                if !seen.contains_key(&name) {
                    break;
                }
            }
            seen.insert(base, count);
        }
        seen.entry(name.to_owned()).or_insert(0);
        names.push(name);
    }
    names
}

/// Resolves an encoding label; `utf-8-sig` is UTF-8 whose byte-order mark is stripped.
pub(crate) fn encoding_for_label(label: &str) -> Result<&'static Encoding, SheetMapperError> {
    let trimmed = label.trim().to_lowercase();
    let name = trimmed.strip_suffix("-sig").unwrap_or(&trimmed);
    Encoding::for_label(name.as_bytes()).ok_or_else(|| SheetMapperError::UnsupportedEncoding(label.to_owned()))
}

pub(crate) fn ascii_delimiter(delimiter: char) -> Result<u8, SheetMapperError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| SheetMapperError::Config(format!("delimiter '{delimiter}' is not an ASCII character")))
}

/// Decodes and splits delimited text. Blank lines are skipped; rows may have different widths.
fn read_delimited(file_name: &str, bytes: &[u8], options: &ReadOptions) -> Result<Vec<Vec<String>>, SheetMapperError> {
    let encoding = encoding_for_label(&options.encoding)?;
    let bytes = match Encoding::for_bom(bytes) {
        Some((bom_encoding, length)) if bom_encoding == encoding => &bytes[length..],
        _ => bytes,
    };
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(SheetMapperError::Parse {
            file_name: file_name.to_owned(),
            message: format!("content is not valid {}", encoding.name()),
        });
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(ascii_delimiter(options.delimiter)?)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records().take(options.rows_limit.unwrap_or(usize::MAX)) {
        let record = record.map_err(|error| as_parse_error(file_name, error.into()))?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok(rows)
}

/// Folds content errors into `Parse`, leaving environmental errors (I/O, configuration) as they are.
fn as_parse_error(file_name: &str, error: SheetMapperError) -> SheetMapperError {
    match error {
        SheetMapperError::Parse { .. } => error,
        error if error.is_content_error() => SheetMapperError::Parse {
            file_name: file_name.to_owned(),
            message: error.to_string(),
        },
        error => error,
    }
}
