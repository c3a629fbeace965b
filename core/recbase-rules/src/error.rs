//! Error types for the rule engine.

use thiserror::Error;

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

/// Every variant surfaces to callers as an invalid rule; none of them is
/// ever turned into a silent deny.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown field '{field}' in collection '{collection}'")]
    UnknownField { collection: String, field: String },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("field '{field}' is not a relation and cannot be traversed")]
    NotARelation { field: String },

    #[error("unsupported modifier ':{modifier}' on file field '{field}'")]
    UnsupportedModifier { modifier: &'static str, field: String },

    #[error("modifier ':{modifier}' cannot be applied to '{path}': {reason}")]
    InvalidModifier {
        modifier: &'static str,
        path: String,
        reason: &'static str,
    },
}

impl RuleError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}
