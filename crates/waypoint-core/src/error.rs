//! The error taxonomy surfaced by the orchestration core.
//!
//! Every variant maps to a stable machine-readable kind at the HTTP
//! boundary. Partial failure is deliberately *not* an error: degraded plans
//! and omitted quizzes travel as warnings on a success response.

use thiserror::Error;

/// Typed failure of a plan or quiz operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Client-fixable input problem; raised before any network call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown plan or quiz identifier.
    #[error("{0} not found")]
    NotFound(String),

    /// Too few usable resources for the requested quiz size.
    #[error("insufficient source material: {0}")]
    InsufficientSource(String),

    /// A mandatory downstream collaborator is unreachable and there is no
    /// safe fallback; the caller should retry later.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unexpected fault (programming error, broken invariant, storage
    /// failure).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Stable machine-readable kind for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::InsufficientSource(_) => "insufficient_source",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}
