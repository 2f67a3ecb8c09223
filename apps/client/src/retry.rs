//! Generic retry-with-backoff executor for a single logical call.
//!
//! The loop is iterative and bounded: it carries `(attempt, delay)`
//! and returns a plain `Result`, so no failure ever crosses a retry
//! boundary as a panic. Delays double without jitter and cap at
//! `max_delay`; the worst-case wall clock is
//! `max_retries * max_delay` plus the calls themselves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;

/// Configuration value governing one retry loop. Not mutable state;
/// clone it freely per call site.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Which failures are worth retrying. The default retries only
    /// transport failures (no HTTP response received); an HTTP error
    /// response is a server decision and is surfaced immediately.
    pub should_retry: Arc<dyn Fn(&ApiError) -> bool + Send + Sync>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            should_retry: Arc::new(ApiError::is_transport),
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// exhausts the policy. The final error is returned unmodified.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut delay = policy.initial_delay;

    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt == policy.max_retries || !(policy.should_retry)(&error) {
                    return Err(error);
                }
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
        }
    }

    unreachable!("retry loop always returns within the bounded range")
}
