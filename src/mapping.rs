//! Resolving a template's aliases against the columns of one source table.

use crate::template::MappingTemplate;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use std::collections::HashMap;
use tracing::warn;

/// Output column -> actual source column, in template order. Unresolved columns map to `""`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedMapping {
    entries: Vec<(String, String)>,
}

impl Serialize for ResolvedMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, source) in &self.entries {
            map.serialize_entry(column, source)?;
        }
        map.end()
    }
}

impl ResolvedMapping {
    pub fn new(entries: Vec<(String, String)>) -> ResolvedMapping {
        ResolvedMapping { entries }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn source(&self, column: &str) -> Option<&str> {
        self.entries.iter().find(|(name, _)| name == column).map(|(_, source)| source.as_str())
    }

    /// Output column names in order
    pub fn output_columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(column, _)| column.as_str()).collect()
    }

    /// Source columns that were resolved
    pub fn resolved_sources(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|(_, source)| source.as_str())
            .filter(|source| !source.is_empty())
            .collect()
    }

    /// Output columns left without a source
    pub fn unresolved(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, source)| source.is_empty())
            .map(|(column, _)| column.as_str())
            .collect()
    }
}

/// Maps every output column of `template` to the source column its alias names.
///
/// Aliases and column names are trimmed, and lowercased when `case_insensitive` is set.
/// When several source columns normalize to the same name the first one wins.
/// An alias matching no column resolves to `""` and is logged; it is never an error.
pub fn resolve_mapping(template: &MappingTemplate, source_columns: &[String], case_insensitive: bool) -> ResolvedMapping {
    let normalize = |name: &str| {
        let name = name.trim();
        if case_insensitive { name.to_lowercase() } else { name.to_owned() }
    };
    let mut by_normalized: HashMap<String, &str> = HashMap::new();
    for column in source_columns {
        by_normalized.entry(normalize(column)).or_insert(column.as_str());
    }

    let entries = template
        .entries()
        .iter()
        .map(|(column, alias)| {
            if alias.trim().is_empty() {
                return (column.to_owned(), String::new());
            }
            match by_normalized.get(&normalize(alias)) {
                Some(source) => (column.to_owned(), source.to_string()),
                None => {
                    warn!(column = %column, alias = %alias, "alias matches no source column");
                    (column.to_owned(), String::new())
                }
            }
        })
        .collect();
    ResolvedMapping { entries }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(entries: &[(&str, &str)]) -> MappingTemplate {
        MappingTemplate::new("T", entries.iter().map(|(column, alias)| (column.to_string(), alias.to_string())).collect())
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn resolves_case_insensitively() {
        let template = template(&[("Name", "Nome"), ("Fee", "Valor")]);
        let resolved = resolve_mapping(&template, &columns(&["nome", "valor", "data"]), true);
        assert_eq!(resolved.entries(), &[
            ("Name".to_owned(), "nome".to_owned()),
            ("Fee".to_owned(), "valor".to_owned()),
        ]);
    }

    #[test]
    fn keeps_original_column_spelling() {
        let template = template(&[("Name", " nome do sócio ")]);
        let resolved = resolve_mapping(&template, &columns(&["Nome do Sócio  ", "nome do sócio"]), true);
        assert_eq!(resolved.source("Name"), Some("Nome do Sócio  "));
    }

    #[test]
    fn case_sensitive_lookup() {
        let template = template(&[("Name", "Nome")]);
        assert_eq!(resolve_mapping(&template, &columns(&["nome"]), false).source("Name"), Some(""));
        assert_eq!(resolve_mapping(&template, &columns(&[" Nome"]), false).source("Name"), Some(" Nome"));
    }

    #[test]
    fn unresolved_and_blank_aliases_are_empty() {
        let template = template(&[("Name", "Nome"), ("Fee", "Quota"), ("Rate", "")]);
        let resolved = resolve_mapping(&template, &columns(&["Nome", "Valor"]), true);
        assert_eq!(resolved.output_columns(), vec!["Name", "Fee", "Rate"]);
        assert_eq!(resolved.resolved_sources(), vec!["Nome"]);
        assert_eq!(resolved.unresolved(), vec!["Fee", "Rate"]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let template = template(&[("Name", "NOME"), ("Fee", "x"), ("Rate", "")]);
        let source = columns(&["Nome", "Taxa"]);
        assert_eq!(resolve_mapping(&template, &source, true), resolve_mapping(&template, &source, true));
    }

    #[test]
    fn serializes_as_ordered_object() {
        let resolved = ResolvedMapping::new(vec![("Name".to_owned(), "nome".to_owned()), ("Fee".to_owned(), "".to_owned())]);
        assert_eq!(serde_json::to_string(&resolved).unwrap(), r#"{"Name":"nome","Fee":""}"#);
    }
}
