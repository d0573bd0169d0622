use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the remote collaborators.
///
/// `RateLimited` is kept apart from every other failure so callers can sleep
/// and retry the same request.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        SourceError::Other(message.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
