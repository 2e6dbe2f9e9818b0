use crate::error::ResultMessage;
use crate::error::SheetMapperError;
use crate::extract::DEFAULT_MIN_NON_EMPTY_FIELDS;
use crate::table::ReadOptions;
use crate::table::DEFAULT_DELIMITER;
use crate::table::DEFAULT_ENCODING;
use crate::template::OutputSchema;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

/// Tunables of one pipeline run. Missing JSON keys take the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delimiter of input `.csv` files, the template store, collaborator text and a `.csv` master
    pub delimiter: char,
    pub encoding: String,
    /// Rows shown to the collaborator when guessing the header or suggesting an alias
    pub preview_rows: usize,
    /// Templates offered to the collaborator
    pub template_candidates: usize,
    pub case_sensitive_similarity: bool,
    pub case_insensitive_columns: bool,
    pub min_non_empty_fields: usize,
    /// Store the resolved mapping on the first row of each file
    pub attach_mapping_template: bool,
    /// Drop the sheet name the collaborator appends to its header guess
    pub strip_sheet_marker: bool,
    /// Ask the collaborator for aliases the chosen template leaves blank or unresolved
    pub complete_blank_aliases: bool,
    /// Delete the master file when the pipeline starts
    pub reset_master: bool,
    /// Glob pattern selecting the worksheet of input workbooks
    pub sheet_name_pattern: Option<String>,
    pub output_columns: OutputSchema,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            encoding: DEFAULT_ENCODING.to_owned(),
            preview_rows: 5,
            template_candidates: 3,
            case_sensitive_similarity: true,
            case_insensitive_columns: true,
            min_non_empty_fields: DEFAULT_MIN_NON_EMPTY_FIELDS,
            attach_mapping_template: true,
            strip_sheet_marker: true,
            complete_blank_aliases: true,
            reset_master: false,
            sheet_name_pattern: None,
            output_columns: OutputSchema::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<PipelineConfig, SheetMapperError> {
        let path = path.as_ref();
        let prefix = format!("config '{}'", path.display());
        let text = std::fs::read_to_string(path).map_err(SheetMapperError::from).with_prefix(&prefix)?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(SheetMapperError::from).with_prefix(&prefix)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SheetMapperError> {
        if !self.delimiter.is_ascii() {
            return Err(SheetMapperError::Config(format!("delimiter '{}' is not an ASCII character", self.delimiter)));
        }
        if self.output_columns.columns().is_empty() {
            return Err(SheetMapperError::Config("no output columns".to_owned()));
        }
        if self.template_candidates == 0 {
            return Err(SheetMapperError::Config("template_candidates must be at least 1".to_owned()));
        }
        Ok(())
    }

    /// Reader options for input files, header not yet known
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            delimiter: self.delimiter,
            encoding: self.encoding.to_owned(),
            header_row: None,
            sheet_name_pattern: self.sheet_name_pattern.to_owned(),
            rows_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn partial_json_keeps_defaults() {
        let directory = TempDir::new().unwrap();
        let path = directory.path().join("config.json");
        fs::write(&path, r#"{
            "delimiter": ",",
            "min_non_empty_fields": 1,
            "output_columns": [{"name": "Name", "store_column": "Nome"}]
        }"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.min_non_empty_fields, 1);
        assert_eq!(config.output_columns.names(), vec!["Name"]);
        assert_eq!(config.preview_rows, 5);
        assert_eq!(config.encoding, "utf-8-sig");
        assert!(config.attach_mapping_template);
        assert_eq!(config.read_options().delimiter, ',');
    }

    #[test]
    fn invalid_files_are_reported() {
        let directory = TempDir::new().unwrap();
        let path = directory.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(PipelineConfig::from_json_file(&path).unwrap_err().to_string().starts_with("config"));

        fs::write(&path, r#"{"delimiter": "§"}"#).unwrap();
        assert!(matches!(PipelineConfig::from_json_file(&path), Err(SheetMapperError::Config(_))));
        assert!(PipelineConfig::from_json_file(directory.path().join("missing.json")).is_err());
    }

    #[test]
    fn default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
