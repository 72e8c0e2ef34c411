use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool loads, transforms, or writes data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Raised when the input root is neither a record object nor an array of records.
    #[error("expected a JSON object or an array of objects at the document root, found {0}")]
    InvalidRoot(&'static str),

    /// Raised when a value that must be a record is not a JSON object.
    #[error("expected a JSON object record, found {0}")]
    NonObjectRecord(&'static str),

    /// Raised when the configuration holds values outside their allowed range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when a sheet does not fit inside the worksheet grid.
    #[error("sheet '{sheet}' has {rows} rows and {columns} columns, exceeding the worksheet limits")]
    SheetLimit {
        sheet: String,
        rows: usize,
        columns: usize,
    },

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
