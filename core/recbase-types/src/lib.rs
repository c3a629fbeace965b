//! Core type definitions for recbase.
//!
//! This crate defines the primitive, collection-agnostic types used
//! throughout the rule engine and hook pipeline:
//! - Record identifiers (UUID v7, rendered as 32 hex chars)
//! - UTC timestamps with the wire format used by the API
//! - [`Value`], the tagged union stored in every record field
//!
//! Field semantics (which values a field may hold, whether a list is a set of
//! relation ids or of plain strings) are defined by the collection schema in
//! `recbase-model`, not here.

mod ids;
mod timestamp;
mod value;

pub use ids::RecordId;
pub use timestamp::Timestamp;
pub use value::Value;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record id: {0}")]
    InvalidId(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
