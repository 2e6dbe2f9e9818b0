//! The master workbook that accumulates standardized rows across files and runs.
//!
//! Every append rewrites the whole file through a temporary file in the same directory,
//! so a failed append leaves the previous master untouched. Callers must not run two
//! accumulators against the same path at once.

use crate::error::SheetMapperError;
use crate::extract::StandardizedRow;
use crate::extract::MAPPING_TEMPLATE_COLUMN;
use crate::spreadsheet::xlsx_writer::write_xlsx;
use crate::spreadsheet::XLSX_EXTENSIONS;
use crate::table::ReadOptions;
use crate::table::Table;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::info;

/// Provenance column carrying the input file's base name on its first row
pub const SOURCE_FILE_COLUMN: &str = "SourceFile";

const MASTER_SHEET_NAME: &str = "Sheet1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MasterFormat {
    Xlsx,
    Csv,
}

/// Append-only master table stored as `.xlsx`/`.xlsm` or `.csv`.
#[derive(Clone, Debug)]
pub struct MasterAccumulator {
    path: PathBuf,
    columns: Vec<String>,
    delimiter: char,
    format: MasterFormat,
}

impl MasterAccumulator {
    /// Binds to `path` without touching the file; `columns` is the layout used when the
    /// master does not exist yet.
    pub fn open(path: impl AsRef<Path>, columns: Vec<String>, delimiter: char) -> Result<MasterAccumulator, SheetMapperError> {
        let path = path.as_ref().to_path_buf();
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let format = if XLSX_EXTENSIONS.contains(&extension.as_str()) {
            MasterFormat::Xlsx
        } else if extension == "csv" {
            MasterFormat::Csv
        } else {
            return Err(SheetMapperError::UnsupportedFormat {
                file_name: path.to_string_lossy().to_string(),
                extension,
            });
        };
        Ok(MasterAccumulator { path, columns, delimiter, format })
    }

    /// Opens the master and writes a header-only file when it is missing.
    /// With `reset` an existing master is deleted first.
    pub fn create(path: impl AsRef<Path>, columns: Vec<String>, reset: bool, delimiter: char) -> Result<MasterAccumulator, SheetMapperError> {
        let master = MasterAccumulator::open(path, columns, delimiter)?;
        if reset && master.path.exists() {
            std::fs::remove_file(&master.path)?;
            info!(path = %master.path.display(), "removed existing master file");
        }
        if !master.path.exists() {
            master.write(&[master.columns.to_owned()])?;
            info!(path = %master.path.display(), "created master file");
        }
        Ok(master)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content; an empty table with the configured columns when the file is missing.
    pub fn read(&self) -> Result<Table, SheetMapperError> {
        let grid = self.read_grid()?;
        if grid.is_empty() {
            return Ok(Table::new(self.columns.to_owned(), Vec::new()));
        }
        Table::from_rows(grid).with_header(0)
    }

    /// The file's rows as stored, header line first.
    fn read_grid(&self) -> Result<Vec<Vec<String>>, SheetMapperError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let options = ReadOptions::default().with_delimiter(self.delimiter);
        let raw = Table::load(&self.path, &options).map_err(|error| self.corrupt(error))?;
        Ok(raw.rows().to_vec())
    }

    /// Appends `new_rows` after the existing rows and rewrites the file.
    ///
    /// Existing columns keep their order; configured columns the file lacks are added at the
    /// end. `SourceFile` receives the base name of `source_file_name` on the first new row only.
    /// Returns the number of rows appended.
    pub fn append(&self, new_rows: &[StandardizedRow], source_file_name: Option<&str>) -> Result<usize, SheetMapperError> {
        let mut grid = self.read_grid()?;
        if grid.is_empty() {
            grid.push(Vec::new());
        }
        // the stored header is kept verbatim, even blank or repeated names
        let mut columns = grid[0].to_owned();
        for column in &self.columns {
            if !columns.contains(column) {
                columns.push(column.to_owned());
            }
        }
        grid[0] = columns.to_owned();
        let source_name = source_file_name.map(base_name).unwrap_or_default();

        for (position, row) in new_rows.iter().enumerate() {
            let values = columns
                .iter()
                .enumerate()
                .map(|(index, column)| match column.as_str() {
                    _ if columns[..index].contains(column) => String::new(),
                    SOURCE_FILE_COLUMN if position == 0 => source_name.to_owned(),
                    SOURCE_FILE_COLUMN => String::new(),
                    column => row.get(column).unwrap_or_default().to_owned(),
                })
                .collect();
            grid.push(values);
        }
        for row in &mut grid {
            row.resize(columns.len(), String::new());
        }
        self.write(&grid)?;
        info!(path = %self.path.display(), appended = new_rows.len(), total = grid.len() - 1, "updated master file");
        Ok(new_rows.len())
    }

    /// Rewrites the whole file from `grid`, header line first.
    fn write(&self, grid: &[Vec<String>]) -> Result<(), SheetMapperError> {
        let directory = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temporary = NamedTempFile::new_in(directory)?;
        match self.format {
            MasterFormat::Xlsx => {
                write_xlsx(temporary.as_file_mut(), MASTER_SHEET_NAME, grid)?;
            }
            MasterFormat::Csv => {
                let text = Table::from_rows(grid.to_vec()).to_delimited(None, self.delimiter, false)?;
                temporary.write_all(text.as_bytes())?;
            }
        }
        temporary.persist(&self.path)?;
        Ok(())
    }

    fn corrupt(&self, error: SheetMapperError) -> SheetMapperError {
        if error.is_content_error() {
            SheetMapperError::MasterFileCorrupt {
                file_name: self.path.to_string_lossy().to_string(),
                message: error.to_string(),
            }
        } else {
            error
        }
    }
}

/// Default master layout: output columns, then the provenance columns.
pub fn master_columns(output_columns: &[String], attach_mapping_template: bool) -> Vec<String> {
    let mut columns = output_columns.to_vec();
    columns.push(SOURCE_FILE_COLUMN.to_owned());
    if attach_mapping_template {
        columns.push(MAPPING_TEMPLATE_COLUMN.to_owned());
    }
    columns
}

fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_owned())
}
