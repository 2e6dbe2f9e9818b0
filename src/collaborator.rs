//! The boundary to the external collaborator (typically a language model) that reads
//! previews and answers with free text.

use crate::error::SheetMapperError;
use crate::mapping::ResolvedMapping;
use crate::table::Table;

/// Answers the three questions the pipeline cannot settle on its own.
/// Implementations own their prompts, timeouts and retries.
pub trait Collaborator {
    /// Given the first rows of a file (delimited, no header) and its sheet name, returns the
    /// text of the header row followed by one extra field naming the sheet. The extra field
    /// is dropped before locating the row unless `strip_sheet_marker` is off.
    fn guess_header_row(&mut self, preview: &str, sheet_name: Option<&str>) -> anyhow::Result<String>;

    /// Picks one of `candidates` (quoted template rows) for `header_row` and returns its text.
    fn choose_template(&mut self, header_row: &str, candidates: &[String]) -> anyhow::Result<String>;

    /// Suggests the source column for `output_column` from a preview of the still unmapped columns.
    /// An empty answer leaves the column unmapped.
    fn suggest_alias(&mut self, output_column: &str, reduced_candidate: &str) -> anyhow::Result<String>;
}

/// Renders up to `limit` rows of `table` (header applied) without the columns already used by
/// `resolved`, every field quoted. Columns are compared trimmed and case-insensitively.
pub fn reduced_candidate(table: &Table, resolved: &ResolvedMapping, limit: usize, delimiter: char) -> Result<String, SheetMapperError> {
    let used: Vec<String> = resolved
        .resolved_sources()
        .iter()
        .map(|source| source.trim().to_lowercase())
        .collect();
    let kept: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| !used.contains(&column.trim().to_lowercase()))
        .map(|(index, _)| index)
        .collect();
    if kept.is_empty() {
        return Ok(String::new());
    }

    let columns = kept.iter().map(|&index| table.columns()[index].to_owned()).collect();
    let rows = table
        .rows()
        .iter()
        .take(limit)
        .map(|row| kept.iter().map(|&index| row[index].to_owned()).collect())
        .collect();
    Table::new(columns, rows).to_delimited(None, delimiter, true)
}
