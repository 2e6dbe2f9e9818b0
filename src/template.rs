//! Mapping templates: which source column feeds each standardized output column.
//!
//! Templates are curated offline in a delimited "template store" whose first row names the
//! store columns (`Template;Nome;Quota;…`) and whose every other row describes one known
//! spreadsheet layout. An `OutputSchema` says which store column provides the alias for each
//! standardized output column.

use crate::error::ResultMessage;
use crate::error::SheetMapperError;
use crate::table::ascii_delimiter;
use crate::table::ReadOptions;
use crate::table::Table;
use csv::ReaderBuilder;
use serde::ser::SerializeMap;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use std::path::Path;

/// One standardized output column and the template-store column holding its alias.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub store_column: String,
}

impl OutputColumn {
    pub fn new(name: &str, store_column: &str) -> OutputColumn {
        OutputColumn {
            name: name.to_owned(),
            store_column: store_column.to_owned(),
        }
    }
}

/// Ordered set of standardized output columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSchema(Vec<OutputColumn>);

impl Default for OutputSchema {
    fn default() -> Self {
        let names = ["Name", "Fee", "NationalID", "MemberNumber", "Rate", "ContributionMonth"];
        OutputSchema(names.iter().map(|name| OutputColumn::new(name, name)).collect())
    }
}

impl OutputSchema {
    pub fn new(columns: Vec<OutputColumn>) -> OutputSchema {
        OutputSchema(columns)
    }

    /// Parses the two-line form: output column names, then the store column for each.
    pub fn parse(text: &str, delimiter: char) -> Result<OutputSchema, SheetMapperError> {
        let lines = parse_lines(text, delimiter)?;
        let (names, store_columns) = match lines.as_slice() {
            [names, store_columns] => (names, store_columns),
            _ => return Err(SheetMapperError::Config(format!("output schema needs 2 lines, found {}", lines.len()))),
        };
        if names.len() != store_columns.len() {
            return Err(SheetMapperError::Config(format!(
                "output schema has {} columns but {} store columns",
                names.len(),
                store_columns.len()
            )));
        }
        Ok(OutputSchema(
            names.iter().zip(store_columns).map(|(name, store_column)| OutputColumn::new(name, store_column)).collect(),
        ))
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.0
    }

    /// Output column names in order
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|column| column.name.to_owned()).collect()
    }
}

/// Ordered `output column -> source alias` pairs describing one known layout.
/// An empty alias means the layout has no such column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingTemplate {
    id: String,
    entries: Vec<(String, String)>,
}

impl Serialize for MappingTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, alias) in &self.entries {
            map.serialize_entry(column, alias)?;
        }
        map.end()
    }
}

impl MappingTemplate {
    pub fn new(id: &str, entries: Vec<(String, String)>) -> MappingTemplate {
        MappingTemplate { id: id.to_owned(), entries }
    }

    /// Parses a template from its two-line delimited form: the store header line, then one
    /// store row. Store columns missing from the text give empty aliases.
    pub fn parse(text: &str, delimiter: char, schema: &OutputSchema) -> Result<MappingTemplate, SheetMapperError> {
        let lines = parse_lines(text, delimiter)?;
        let (header, values) = match lines.as_slice() {
            [header, values] => (header, values),
            _ => {
                return Err(SheetMapperError::Parse {
                    file_name: "template".to_owned(),
                    message: format!("expected a header line and a value line, found {} lines", lines.len()),
                })
            }
        };
        let table = Table::new(header.to_owned(), vec![values.to_owned()]);
        Ok(template_from_table_row(&table, 0, schema))
    }

    /// Value of the store's first column, usually the template name
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn alias(&self, column: &str) -> Option<&str> {
        self.entries.iter().find(|(name, _)| name == column).map(|(_, alias)| alias.as_str())
    }

    /// Output columns without an alias
    pub fn blank_columns(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, alias)| alias.trim().is_empty())
            .map(|(column, _)| column.as_str())
            .collect()
    }

    /// A copy with `column` mapped to `alias`
    pub fn with_alias(&self, column: &str, alias: &str) -> MappingTemplate {
        let mut template = self.clone();
        if let Some(entry) = template.entries.iter_mut().find(|(name, _)| name == column) {
            entry.1 = alias.to_owned();
        }
        template
    }
}

/// The curated collection of known templates.
#[derive(Clone, Debug)]
pub struct TemplateStore {
    table: Table,
}

impl TemplateStore {
    /// Loads the store; its first row names the store columns.
    pub fn load(path: impl AsRef<Path>, options: &ReadOptions) -> Result<TemplateStore, SheetMapperError> {
        let path = path.as_ref();
        let options = options.clone().with_header_row(Some(0));
        let table = Table::load(path, &options).with_prefix(&format!("template store '{}'", path.display()))?;
        Ok(TemplateStore { table })
    }

    pub fn from_table(table: Table) -> TemplateStore {
        TemplateStore { table }
    }

    /// Candidate rows, one per template
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The store column names joined with `delimiter`
    pub fn header_line(&self, delimiter: char) -> String {
        self.table.columns().join(&delimiter.to_string())
    }

    /// Builds the template described by store row `row`.
    pub fn template_for(&self, row: usize, schema: &OutputSchema) -> Result<MappingTemplate, SheetMapperError> {
        if row >= self.table.len() {
            return Err(SheetMapperError::RowNotFound(format!("template {row} of {}", self.table.len())));
        }
        Ok(template_from_table_row(&self.table, row, schema))
    }
}

fn template_from_table_row(table: &Table, row: usize, schema: &OutputSchema) -> MappingTemplate {
    let id = table.row(row).and_then(|values| values.first()).map(String::as_str).unwrap_or_default();
    let entries = schema
        .columns()
        .iter()
        .map(|column| {
            let alias = table.value(row, &column.store_column).unwrap_or_default();
            (column.name.to_owned(), alias.to_owned())
        })
        .collect();
    MappingTemplate::new(id, entries)
}

/// Removes an echoed store header from the start of a collaborator's template answer,
/// returning the remaining row text.
pub fn strip_store_header<'a>(answer: &'a str, store: &TemplateStore, delimiter: char) -> &'a str {
    let header = store.header_line(delimiter);
    let answer = answer.trim();
    match answer.strip_prefix(&header) {
        Some(rest) => rest.trim_start_matches(|c: char| c == ':' || c == delimiter || c.is_whitespace()),
        None => answer,
    }
}

fn parse_lines(text: &str, delimiter: char) -> Result<Vec<Vec<String>>, SheetMapperError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(ascii_delimiter(delimiter)?)
        .from_reader(text.trim().as_bytes());
    let mut lines = Vec::new();
    for record in reader.records() {
        lines.push(record?.iter().map(|field| field.trim().to_owned()).collect());
    }
    Ok(lines)
}
