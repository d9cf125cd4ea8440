//! Store call retry logic
//!
//! A batch flush runs through [`retry_store_op`] as one unit: a transient
//! failure in either the existence check or the bulk insert restarts the
//! flush from its lookup.

use reviews_common::Result;
use std::time::{Duration, Instant};

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap for the doubling delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Retry a store operation with exponential backoff.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is transient and retries remain: log WARN, backoff, retry
/// 4. Otherwise return the last error
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "batch flush")
/// * `policy` - Retry budget and backoff bounds
/// * `operation` - Async closure that performs the store call
pub async fn retry_store_op<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let mut attempt: u32 = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Store operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() || attempt > policy.max_retries {
                    if attempt > 1 {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis() as u64,
                            "Store operation failed: retries exhausted"
                        );
                    }
                    return Err(err);
                }

                let delay = backoff.min(policy.max_backoff);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Store operation failed, will retry after backoff"
                );

                tokio::time::sleep(delay).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}
