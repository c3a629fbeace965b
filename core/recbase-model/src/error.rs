//! Error types for the record model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by schema validation and catalog lookups.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("collection not found: {0}")]
    UnknownCollection(String),

    #[error("unknown field '{field}' in collection '{collection}'")]
    UnknownField { collection: String, field: String },

    #[error("field '{field}' expects {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("field '{0}' is required")]
    Required(String),

    #[error("field '{field}' accepts at most {max} item(s)")]
    TooManyItems { field: String, max: usize },

    #[error("collection '{0}' is read-only")]
    ReadOnly(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}
