use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use crate::error::SourceError;

/// Fallback wait when a 429 response carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

pub fn create_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(concat!("watchsync/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Parse a `Retry-After` header given in seconds
pub fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Map non-success statuses onto [`SourceError`], keeping 429 distinguishable
pub async fn check_status(response: Response, context: &str) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited {
            retry_after: retry_after(&response),
        });
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SourceError::Unauthorized(format!("{}: {}", context, status)))
        }
        StatusCode::NOT_FOUND => Err(SourceError::NotFound(context.to_string())),
        _ => Err(SourceError::Api {
            status: status.as_u16(),
            message: format!("{}: {}", context, body),
        }),
    }
}
