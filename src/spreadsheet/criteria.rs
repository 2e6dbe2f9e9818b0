use glob::Pattern;

/// Criteria for selecting the sheet and rows to read from a workbook.
#[derive(Clone, Debug, Default)]
pub(crate) struct Criteria {
    /// Sheet name pattern; the first matching sheet is read. `None` reads the first sheet.
    pub(crate) sheet_name_pattern: Option<Pattern>,

    /// Maximum number of rows to read, counted from the first row holding data.
    pub(crate) rows_limit: Option<usize>,
}

impl Criteria {
    /// Checks if a sheet name matches the pattern (always true without one).
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        self.sheet_name_pattern
            .as_ref()
            .map(|pattern| pattern.matches(sheet_name))
            .unwrap_or(true)
    }
}
