//! Bounded exponential backoff for external collaborator calls.
//!
//! Only transient failures are retried; permanent rejections and
//! storage/domain errors return immediately.

use std::future::Future;

use questline_core::config::RetryConfig;
use questline_core::error::EngineError;
use tracing::warn;

/// Runs `operation`, retrying transient failures up to the configured
/// budget with exponential backoff.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or immediately for
/// non-transient errors.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    %label,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
