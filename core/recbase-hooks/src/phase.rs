//! Lifecycle of one mutation through its hook chains.

use std::fmt;

/// Where a mutation currently is.
///
/// ```text
/// RequestPre -> ModelPre -> Validate -> Execute -> Persisted
///     -> PostSuccess | PostError -> RequestPost
/// ```
///
/// `Halted` is terminal and reachable from every pre-commit phase.
/// `PostError` is also reachable from any pre-commit phase when the
/// mutation fails before its write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    RequestPre,
    ModelPre,
    Validate,
    Execute,
    Persisted,
    PostSuccess,
    PostError,
    RequestPost,
    Halted,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestPre => "request_pre",
            Self::ModelPre => "model_pre",
            Self::Validate => "validate",
            Self::Execute => "execute",
            Self::Persisted => "persisted",
            Self::PostSuccess => "post_success",
            Self::PostError => "post_error",
            Self::RequestPost => "request_post",
            Self::Halted => "halted",
        }
    }

    /// True once the storage write has been committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Persisted | Self::PostSuccess)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted | Self::RequestPost)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_advance_to(&self, to: Phase) -> bool {
        use Phase::*;
        match (self, to) {
            (RequestPre, ModelPre)
            | (ModelPre, Validate)
            | (Validate, Execute)
            | (Execute, Persisted)
            | (Persisted, PostSuccess)
            | (PostSuccess | PostError, RequestPost) => true,
            // a model chain can be entered without a request around it
            (RequestPre, RequestPost) => true,
            (RequestPre | ModelPre | Validate | Execute, Halted | PostError) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
