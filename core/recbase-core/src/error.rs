//! Error taxonomy surfaced by the orchestrators.

use recbase_model::ModelError;
use recbase_rules::RuleError;
use recbase_storage::StorageError;
use thiserror::Error;

/// Result type for orchestrated operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Every failure an API operation can end in.
///
/// A rule that evaluates to false is not an error by itself; the request
/// orchestrator maps it to one of these variants depending on the operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// A rule failed to parse or referenced something that does not exist.
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] RuleError),

    /// The rule is locked and the caller is not a superuser.
    #[error("only superusers can perform this action")]
    Forbidden,

    /// Missing record, or an existing record the caller may not see.
    #[error("the requested resource wasn't found")]
    NotFound,

    /// Body failed schema validation or the create rule did not pass.
    #[error("failed to process the request: {0}")]
    InputRejected(String),

    /// A handler raised an error.
    #[error("hook aborted the operation: {0}")]
    HookAborted(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The caller stopped waiting (deadline or dropped future). Writes that
    /// had not reached their commit are rolled back; a commit already under
    /// way still lands.
    #[error("the caller stopped waiting; the write may or may not have been applied")]
    Aborted,
}

impl ApiError {
    /// Shorthand for handlers that want to stop a chain with a message.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::HookAborted(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::InputRejected(message.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRule(_) | Self::InputRejected(_) | Self::HookAborted(_) => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Aborted => 408,
            Self::StorageFailure(_) => 500,
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        Self::InputRejected(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound,
            other => Self::StorageFailure(other.to_string()),
        }
    }
}
