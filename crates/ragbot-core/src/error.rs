//! Request-level error classification.
//!
//! Every ingestion, chat, and admin operation returns an [`ApiResult`].
//! Route adapters (HTTP, CLI) map the variant to a status code without
//! inspecting message text.

use thiserror::Error;

/// Tagged failure of a request-level operation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller sent something malformed (empty file, bad Q&A line, ...).
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A third-party service (completion model, crawler) failed and there is
    /// no meaningful fallback.
    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Machine-readable error code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
