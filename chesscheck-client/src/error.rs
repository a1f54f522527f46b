use std::time::Duration;

use chesscheck_core::Platform;

use crate::UserValidation;

/// Failure of a single upstream call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("upstream rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    /// Gateway or availability failure (502, 503, 504).
    #[error("upstream unavailable (HTTP {status})")]
    Unavailable {
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("client error: {0}")]
    Client(String),
}

impl UpstreamError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Connection(_)
                | Self::RateLimited { .. }
                | Self::Unavailable { .. }
        )
    }

    /// Delay the upstream asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } | Self::Unavailable { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Connection(err.to_string())
        } else if err.is_builder() {
            Self::Client(err.to_string())
        } else {
            Self::InvalidResponse(err.to_string())
        }
    }
}

/// Outcome of the retry orchestrator when no attempt succeeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("circuit open")]
    CircuitOpen,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Errors surfaced to callers of `validate_user`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("{0} is temporarily unavailable (circuit open)")]
    CircuitOpen(Platform),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("invalid username: {0}")]
    InvalidUsername(String),
}

impl ValidationError {
    pub(crate) fn from_retry(platform: Platform, err: RetryError) -> Self {
        match err {
            RetryError::CircuitOpen => Self::CircuitOpen(platform),
            RetryError::Upstream(err) => Self::Upstream(err.to_string()),
        }
    }

    /// Collapse the error into the `(exists, message)` form.
    pub fn outcome(&self) -> UserValidation {
        UserValidation {
            exists: false,
            message: self.to_string(),
        }
    }
}
