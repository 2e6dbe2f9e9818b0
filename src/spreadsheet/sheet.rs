use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::SpreadsheetError;

/// Largest grid `into_rows` will allocate
pub(crate) const MAX_GRID_CELLS: usize = 20_000_000;

/// One worksheet's non-empty cells, in row-major order, plus the bounds they occupy.
pub(crate) struct Sheet {
    /// Source file name
    pub(crate) file_name: String,
    /// Sheet name
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    /// Row limit counted from the first row holding data
    limit: Option<usize>,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(super) fn new(file_name: &str, name: &str, limit: Option<usize>) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            limit,
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Checks if a row lies beyond the row limit.
    pub(super) fn after_row_limit(&self, row: usize) -> bool {
        self.row_lower_bound
            .zip(self.limit)
            .map(|(row_lower_bound, limit)| row_lower_bound + limit <= row)
            .unwrap_or(false)
    }

    /// Adds a cell, widening the data range.
    pub(super) fn push(&mut self, cell: Cell) {
        if self.row_lower_bound.map(|lower| cell.row < lower).unwrap_or(true) {
            self.row_lower_bound = Some(cell.row);
        }
        if self.row_upper_bound.map(|upper| upper < cell.row).unwrap_or(true) {
            self.row_upper_bound = Some(cell.row);
        }
        if self.col_lower_bound.map(|lower| cell.col < lower).unwrap_or(true) {
            self.col_lower_bound = Some(cell.col);
        }
        if self.col_upper_bound.map(|upper| upper < cell.col).unwrap_or(true) {
            self.col_upper_bound = Some(cell.col);
        }
        self.cells.push(cell);
    }

    /// Lays the cells out as a dense grid covering the data range.
    /// Blank rows inside the range are kept so row positions stay meaningful.
    /// Fails when the range holds more than `MAX_GRID_CELLS` cells.
    pub(crate) fn into_rows(mut self) -> Result<Vec<Vec<String>>, SpreadsheetError> {
        let (Some(row_lower), Some(row_upper), Some(col_lower), Some(col_upper)) = (
            self.row_lower_bound,
            self.row_upper_bound,
            self.col_lower_bound,
            self.col_upper_bound,
        ) else {
            return Ok(Vec::new());
        };
        let width = col_upper - col_lower + 1;
        let height = row_upper - row_lower + 1;
        if width.checked_mul(height).map(|cells| cells > MAX_GRID_CELLS).unwrap_or(true) {
            return Err(SpreadsheetError::RangeTooLargeError(self.file_name, self.name, height, width));
        }
        let mut rows = vec![vec![String::new(); width]; height];
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
        for cell in self.cells {
            rows[cell.row - row_lower][cell.col - col_lower] = cell.to_string();
        }
        Ok(rows)
    }
}
