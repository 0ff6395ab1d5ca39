//! Error types for record decoding and normalization

use thiserror::Error;

/// Result type alias for per-record operations
pub type Result<T> = std::result::Result<T, RecordError>;

/// A single upstream record could not be turned into a canonical order.
///
/// These errors are scoped to one record: the caller excludes the record
/// and keeps processing the rest of the page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("invalid number in '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid timestamp in '{field}': {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
}

impl RecordError {
    /// Name of the upstream field that caused the failure
    pub fn field(&self) -> &'static str {
        match self {
            RecordError::MissingField { field }
            | RecordError::InvalidNumber { field, .. }
            | RecordError::InvalidTimestamp { field, .. } => field,
        }
    }
}
