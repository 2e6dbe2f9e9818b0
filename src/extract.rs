//! Standardized rows extracted from a source table through a resolved mapping.

use crate::error::SheetMapperError;
use crate::mapping::ResolvedMapping;
use crate::table::Table;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use tracing::debug;

/// Provenance column carrying the serialized mapping on the first row of each file
pub const MAPPING_TEMPLATE_COLUMN: &str = "MappingTemplateUsed";

/// Default row-validity threshold: rows need more than this many non-empty fields
pub const DEFAULT_MIN_NON_EMPTY_FIELDS: usize = 2;

/// One output row in the standardized column layout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StandardizedRow {
    values: Vec<(String, String)>,
    mapping_template: Option<String>,
}

impl Serialize for StandardizedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let length = self.values.len() + usize::from(self.mapping_template.is_some());
        let mut map = serializer.serialize_map(Some(length))?;
        for (column, value) in &self.values {
            map.serialize_entry(column, value)?;
        }
        if let Some(mapping_template) = &self.mapping_template {
            map.serialize_entry(MAPPING_TEMPLATE_COLUMN, mapping_template)?;
        }
        map.end()
    }
}

impl StandardizedRow {
    pub fn new(values: Vec<(String, String)>) -> StandardizedRow {
        StandardizedRow { values, mapping_template: None }
    }

    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    /// Value of an output column, or of `MappingTemplateUsed`
    pub fn get(&self, column: &str) -> Option<&str> {
        if column == MAPPING_TEMPLATE_COLUMN {
            return self.mapping_template.as_deref();
        }
        self.values.iter().find(|(name, _)| name == column).map(|(_, value)| value.as_str())
    }

    pub fn mapping_template(&self) -> Option<&str> {
        self.mapping_template.as_deref()
    }

    pub fn non_empty_count(&self) -> usize {
        self.values.iter().filter(|(_, value)| !value.is_empty()).count()
    }
}

/// Extracts every data row below `header_row_index`.
///
/// `table` is the raw, header-less table; the row at `header_row_index` names the columns
/// that `resolved` refers to. Values are trimmed and whole numbers lose their decimal part
/// (`12.0` becomes `12`). Rows with `min_non_empty_fields` or fewer non-empty output fields
/// are dropped. Row order is preserved.
pub fn extract(
    table: &Table,
    header_row_index: usize,
    resolved: &ResolvedMapping,
    min_non_empty_fields: usize,
) -> Result<Vec<StandardizedRow>, SheetMapperError> {
    let data = table.with_header(header_row_index)?;
    let whole_number = Regex::new(r"^[+-]?\d+\.0+$")?;
    let sources: Vec<(&str, Option<usize>)> = resolved
        .entries()
        .iter()
        .map(|(column, source)| {
            let index = if source.is_empty() { None } else { data.column_index(source) };
            (column.as_str(), index)
        })
        .collect();

    let mut rows = Vec::new();
    for (position, cells) in data.rows().iter().enumerate() {
        let values: Vec<(String, String)> = sources
            .iter()
            .map(|(column, index)| {
                let value = index
                    .and_then(|index| cells.get(index))
                    .map(|value| normalize_value(value, &whole_number))
                    .unwrap_or_default();
                (column.to_string(), value)
            })
            .collect();
        let row = StandardizedRow::new(values);
        if row.non_empty_count() > min_non_empty_fields {
            rows.push(row);
        } else {
            debug!(row = header_row_index + 1 + position, "skipped row with too few values");
        }
    }
    Ok(rows)
}

/// Stores the serialized mapping on the first row only.
pub fn attach_mapping_template(rows: &mut [StandardizedRow], resolved: &ResolvedMapping) -> Result<(), SheetMapperError> {
    if let Some(first) = rows.first_mut() {
        first.mapping_template = Some(serde_json::to_string(resolved)?);
    }
    for row in rows.iter_mut().skip(1) {
        row.mapping_template = Some(String::new());
    }
    Ok(())
}

fn normalize_value(value: &str, whole_number: &Regex) -> String {
    let value = value.trim();
    if whole_number.is_match(value) {
        let integer = value.split('.').next().unwrap_or(value);
        return integer.strip_prefix('+').unwrap_or(integer).to_owned();
    }
    value.to_owned()
}
