use thiserror::Error;

/// Main error type for the sheet mapper.
/// Aggregates errors from the standard library, dependencies and internal modules,
/// plus the per-file failure taxonomy of the extraction pipeline.
#[derive(Error, Debug)]
pub enum SheetMapperError {
    #[error("{0}")]
    WithContextError(String),

    // Pipeline taxonomy
    #[error("File not found: '{0}'")]
    FileNotFound(String),

    #[error("Unsupported file format '{extension}' for '{file_name}'")]
    UnsupportedFormat { file_name: String, extension: String },

    #[error("Unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("Malformed content in '{file_name}': {message}")]
    Parse { file_name: String, message: String },

    #[error("Row '{0}' not found")]
    RowNotFound(String),

    #[error("No rows extracted from '{0}'")]
    NoRowsExtracted(String),

    #[error("Master file '{file_name}' is corrupt: {message}")]
    MasterFileCorrupt { file_name: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] anyhow::Error),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    PersistError(#[from] tempfile::PersistError),

    #[error("{0}")]
    RegexError(#[from] regex::Error),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

impl SheetMapperError {
    /// True for errors caused by the content of a file rather than by the environment.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::CsvError(_)
                | Self::ZipError(_)
                | Self::XmlError(_)
                | Self::XmlEncodingError(_)
                | Self::XmlAttributeError(_)
                | Self::XmlHelperError(_)
                | Self::CfbHelperError(_)
                | Self::Biff8HelperError(_)
                | Self::SpreadsheetError(_)
                | Self::XlsError(_)
                | Self::ParseIntError(_)
                | Self::ParseFloatError(_)
                | Self::StringEncodingError(_)
        )
    }
}

pub type Result<T, E = SheetMapperError> = std::result::Result<T, E>;

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetMapperError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SheetMapperError::WithContextError(format!("{}: {}", message, e)))
    }
}
