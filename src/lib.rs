//! # Sheet Mapper
//!
//! Maps spreadsheets of unknown layout onto a fixed output schema and accumulates the
//! standardized rows in a master workbook.
//!
//! For every input file the pipeline:
//!
//! 1. loads the file as a header-less text table (`.csv`, `.xlsx`, `.xlsm`, `.xls`),
//! 2. locates the header row the external collaborator pointed at,
//! 3. picks the closest known template by character-sequence similarity,
//! 4. resolves the template's column aliases against the real column names,
//! 5. extracts standardized rows, dropping rows with too few values,
//! 6. appends them to the master file in a single all-or-nothing write.
//!
//! The collaborator (usually a language model) is supplied by the caller through the
//! [`Collaborator`] trait; this crate never performs network calls itself.

pub mod collaborator;
pub mod config;
pub mod error;
pub mod extract;
pub mod locate;
pub mod logging;
pub mod mapping;
pub mod master;
pub mod pipeline;
pub mod similarity;
pub mod table;
pub mod template;

mod helpers;
mod spreadsheet;

pub use crate::collaborator::Collaborator;
pub use crate::config::PipelineConfig;
pub use crate::error::SheetMapperError;
pub use crate::extract::StandardizedRow;
pub use crate::mapping::ResolvedMapping;
pub use crate::master::MasterAccumulator;
pub use crate::pipeline::BatchSummary;
pub use crate::pipeline::FileOutcome;
pub use crate::pipeline::FileStage;
pub use crate::pipeline::Pipeline;
pub use crate::similarity::SimilarityMatch;
pub use crate::table::ReadOptions;
pub use crate::table::Table;
pub use crate::template::MappingTemplate;
pub use crate::template::OutputSchema;
pub use crate::template::TemplateStore;
