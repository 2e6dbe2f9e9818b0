//! Locating a known row (usually the header) inside a table.

use crate::error::SheetMapperError;
use crate::table::Table;

/// Index of the first row that, joined with `column_separator`, equals `target_row_text`.
///
/// Both sides are trimmed and runs of whitespace are collapsed before comparing.
pub fn find_row_index(table: &Table, target_row_text: &str, column_separator: char) -> Result<usize, SheetMapperError> {
    let target = normalize(target_row_text);
    let separator = column_separator.to_string();
    table
        .rows()
        .iter()
        .position(|row| normalize(&row.join(&separator)) == target)
        .ok_or_else(|| SheetMapperError::RowNotFound(target_row_text.to_owned()))
}

/// Drops the last `delimiter`-separated field, e.g. the sheet name appended to a header guess.
/// Text without a delimiter is returned unchanged.
pub fn strip_trailing_field(text: &str, delimiter: char) -> &str {
    match text.rfind(delimiter) {
        Some(position) => &text[..position],
        None => text,
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
