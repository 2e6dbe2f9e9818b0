//! Per-file orchestration: load, locate the header, choose a template, resolve the mapping,
//! extract rows and append them to the master.
//!
//! Files are processed one at a time. A failure ends the file it happened in and is recorded
//! in the batch summary; the batch always continues with the next file.

use crate::collaborator::reduced_candidate;
use crate::collaborator::Collaborator;
use crate::config::PipelineConfig;
use crate::error::SheetMapperError;
use crate::extract::attach_mapping_template;
use crate::extract::extract;
use crate::locate::find_row_index;
use crate::locate::strip_trailing_field;
use crate::mapping::resolve_mapping;
use crate::master::master_columns;
use crate::master::MasterAccumulator;
use crate::similarity::most_similar_row;
use crate::similarity::rank;
use crate::table::Table;
use crate::template::strip_store_header;
use crate::template::TemplateStore;
use glob::glob;
use glob::Pattern;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Progress of one input file. The last three states are terminal failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStage {
    Loaded,
    HeaderLocated,
    TemplateChosen,
    MappingResolved,
    RowsExtracted,
    Accumulated,
    HeaderNotFound,
    NoRowsExtracted,
    Failed,
}

/// What happened to one input file
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// Base name of `path`
    pub file_name: String,
    pub stage: FileStage,
    pub header_row_index: Option<usize>,
    pub template_id: Option<String>,
    pub rows_extracted: usize,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl FileOutcome {
    pub fn is_extracted(&self) -> bool {
        self.stage == FileStage::Accumulated && self.rows_extracted > 0
    }
}

/// Result of a batch run
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub files_able_to_extract_data: Vec<String>,
    pub files_unable_to_extract_data: Vec<String>,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: FileOutcome) {
        if outcome.is_extracted() {
            self.files_able_to_extract_data.push(outcome.file_name.to_owned());
        } else {
            self.files_unable_to_extract_data.push(outcome.file_name.to_owned());
        }
        self.outcomes.push(outcome);
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    store: TemplateStore,
    master: MasterAccumulator,
}

impl Pipeline {
    /// Validates `config` and prepares the master file (reset first when configured).
    pub fn new(config: PipelineConfig, store: TemplateStore, master_path: impl AsRef<Path>) -> Result<Pipeline, SheetMapperError> {
        config.validate()?;
        let columns = master_columns(&config.output_columns.names(), config.attach_mapping_template);
        let master = MasterAccumulator::create(master_path, columns, config.reset_master, config.delimiter)?;
        Ok(Pipeline { config, store, master })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn master(&self) -> &MasterAccumulator {
        &self.master
    }

    /// Processes every file in order.
    pub fn run_batch(&self, paths: &[PathBuf], collaborator: &mut dyn Collaborator) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for path in paths {
            summary.record(self.process_file(path, collaborator));
        }
        info!(
            able = summary.files_able_to_extract_data.len(),
            unable = summary.files_unable_to_extract_data.len(),
            "batch finished"
        );
        summary
    }

    /// Runs one file through every stage. Never fails: errors end up in the outcome.
    pub fn process_file(&self, path: &Path, collaborator: &mut dyn Collaborator) -> FileOutcome {
        let started = Instant::now();
        let mut outcome = FileOutcome {
            path: path.to_path_buf(),
            file_name: base_name(path),
            stage: FileStage::Loaded,
            header_row_index: None,
            template_id: None,
            rows_extracted: 0,
            error: None,
            elapsed_ms: 0,
        };
        info!(file = %outcome.file_name, "processing file");

        let result = self.run_stages(path, collaborator, &mut outcome);
        outcome.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(()) => {
                info!(file = %outcome.file_name, rows = outcome.rows_extracted, elapsed_ms = outcome.elapsed_ms, "file accumulated");
            }
            Err(SheetMapperError::NoRowsExtracted(_)) => {
                outcome.stage = FileStage::NoRowsExtracted;
                warn!(file = %outcome.file_name, elapsed_ms = outcome.elapsed_ms, "no rows extracted");
            }
            Err(failure) => {
                outcome.stage = match (&failure, outcome.stage) {
                    (SheetMapperError::RowNotFound(_), FileStage::Loaded) => FileStage::HeaderNotFound,
                    _ => FileStage::Failed,
                };
                error!(file = %outcome.file_name, stage = ?outcome.stage, error = %failure, "file aborted");
                outcome.error = Some(failure.to_string());
            }
        }
        outcome
    }

    fn run_stages(&self, path: &Path, collaborator: &mut dyn Collaborator, outcome: &mut FileOutcome) -> Result<(), SheetMapperError> {
        let config = &self.config;
        let delimiter = config.delimiter;
        let table = Table::load(path, &config.read_options())?;

        let preview = table.to_delimited(Some(config.preview_rows), delimiter, false)?;
        let guess = collaborator.guess_header_row(&preview, table.sheet_name())?;
        debug!(file = %outcome.file_name, guess = %guess, "header guess");
        let header_text = if config.strip_sheet_marker {
            strip_trailing_field(guess.trim(), delimiter)
        } else {
            guess.trim()
        };
        let header_row_index = find_row_index(&table, header_text, delimiter)?;
        outcome.header_row_index = Some(header_row_index);
        outcome.stage = FileStage::HeaderLocated;

        let store_table = self.store.table();
        let candidates: Vec<String> = rank(store_table, header_text, delimiter, config.case_sensitive_similarity, config.template_candidates)
            .iter()
            .map(|candidate| candidate.quoted(delimiter))
            .collect();
        let answer = collaborator.choose_template(header_text, &candidates)?;
        debug!(file = %outcome.file_name, answer = %answer, "template answer");
        let chosen = strip_store_header(&answer, &self.store, delimiter).replace('"', "");
        let best = most_similar_row(store_table, &chosen, delimiter, config.case_sensitive_similarity)
            .ok_or_else(|| SheetMapperError::Config("template store has no templates".to_owned()))?;
        let mut template = self.store.template_for(best.index, &config.output_columns)?;
        debug!(
            file = %outcome.file_name,
            template = %template.id(),
            score = best.score,
            blank = ?template.blank_columns(),
            "template chosen"
        );
        outcome.template_id = Some(template.id().to_owned());
        outcome.stage = FileStage::TemplateChosen;

        let source = table.with_header(header_row_index)?;
        let mut resolved = resolve_mapping(&template, source.columns(), config.case_insensitive_columns);
        if config.complete_blank_aliases {
            let unresolved: Vec<String> = resolved.unresolved().iter().map(|column| column.to_string()).collect();
            for column in unresolved {
                let reduced = reduced_candidate(&source, &resolved, config.preview_rows, delimiter)?;
                let alias = collaborator.suggest_alias(&column, &reduced)?;
                let alias = alias.trim().trim_matches('"');
                if alias.is_empty() {
                    continue;
                }
                debug!(file = %outcome.file_name, column = %column, alias = %alias, "alias suggested");
                template = template.with_alias(&column, alias);
                resolved = resolve_mapping(&template, source.columns(), config.case_insensitive_columns);
            }
        }
        outcome.stage = FileStage::MappingResolved;

        let mut rows = extract(&table, header_row_index, &resolved, config.min_non_empty_fields)?;
        if rows.is_empty() {
            return Err(SheetMapperError::NoRowsExtracted(outcome.file_name.to_owned()));
        }
        if config.attach_mapping_template {
            attach_mapping_template(&mut rows, &resolved)?;
        }
        outcome.rows_extracted = rows.len();
        outcome.stage = FileStage::RowsExtracted;

        let source_file_name = path.to_string_lossy();
        self.master.append(&rows, Some(source_file_name.as_ref()))?;
        outcome.stage = FileStage::Accumulated;
        Ok(())
    }
}

/// Expands glob patterns into an ordered list of files without duplicates.
/// A pattern without wildcards is kept even when the file does not exist.
pub fn expand_inputs(patterns: &[&str]) -> Result<Vec<PathBuf>, SheetMapperError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();
    for pattern in patterns {
        let paths = if Pattern::escape(pattern) == *pattern {
            vec![PathBuf::from(*pattern)]
        } else {
            glob(pattern)?
                .map(|entry| entry.map_err(std::io::Error::from))
                .collect::<Result<Vec<_>, _>>()?
        };
        for path in paths {
            if seen.insert(path.to_owned()) {
                inputs.push(path);
            }
        }
    }
    Ok(inputs)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
