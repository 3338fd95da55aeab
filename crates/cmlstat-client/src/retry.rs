//! Retry with exponential backoff for usage API calls

use cmlstat_core::config::RetryPolicy;
use cmlstat_core::error::{CmlstatError, Result};
use std::future::Future;
use tracing::{debug, warn};

/// Run `op` until it succeeds, fails permanently, or runs out of retries.
///
/// Only errors for which [`CmlstatError::is_retryable`] holds are retried.
/// Any failure that ends the loop is reported as [`CmlstatError::Fetch`]
/// carrying the endpoint, the number of attempts made, and the last error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, endpoint: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry_attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry_attempt < policy.max_retries => {
                let backoff = policy.backoff_for(retry_attempt);
                warn!(
                    endpoint,
                    retry_attempt = retry_attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying usage API call with exponential backoff"
                );
                tokio::time::sleep(backoff).await;
                retry_attempt += 1;
            }
            Err(e) => {
                debug!(endpoint, retryable = e.is_retryable(), "Giving up on usage API call");
                return Err(CmlstatError::Fetch {
                    endpoint: endpoint.to_string(),
                    attempts: retry_attempt + 1,
                    message: e.to_string(),
                });
            }
        }
    }
}
