//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// A record with the same id already exists.
    #[error("record already exists: {collection}/{id}")]
    Conflict { collection: String, id: String },

    /// The store has no table for this collection.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// Stored data could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
