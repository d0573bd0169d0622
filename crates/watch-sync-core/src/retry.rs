use std::future::Future;
use tracing::warn;
use watch_sync_sources::SourceError;

/// Run `call`, sleeping and retrying while the remote answers "too many
/// requests". After `max_retries` retries the rate-limit error is returned.
pub async fn with_rate_limit_retry<T, F, Fut>(operation: &str, max_retries: u32, mut call: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut retries = 0;
    loop {
        match call().await {
            Err(SourceError::RateLimited { retry_after }) if retries < max_retries => {
                retries += 1;
                warn!(
                    operation = operation,
                    retry_after_ms = retry_after.as_millis() as u64,
                    attempt = retries,
                    "Rate limited, waiting before retry"
                );
                tokio::time::sleep(retry_after).await;
            }
            result => return result,
        }
    }
}
