//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid field '{field}': {reason}")]
    FieldParse { field: String, reason: String },

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn field(field: &str, reason: impl Into<String>) -> Self {
        Self::FieldParse {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
