//! Bounded retry with backoff for model calls and persistence writes.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

/// Retry policy with a fixed backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Delay before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    /// Run an operation, retrying retryable failures.
    ///
    /// Non-retryable errors (invalid input, timeouts, parse failures)
    /// are returned immediately.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(op = op_name, attempt, error = %err, "retrying after failure");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
