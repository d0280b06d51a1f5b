//! Retry policy for provider calls with exponential backoff
//!
//! Transient failures are retried with a growing, jittered delay until the
//! attempt budget runs out. Permanent failures return on the first attempt.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new RetryPolicy with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a RetryPolicy with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        })
    }

    /// Execute an async operation with retry logic
    ///
    /// The operation runs at most `max_attempts` times. A non-retryable error
    /// is returned immediately; a retryable one triggers a backoff sleep and
    /// another attempt while budget remains. The last error is returned once
    /// the budget is spent.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() {
                        debug!(attempt, error = %err, "Permanent error, not retrying");
                        return Err(err);
                    }
                    if attempt >= max_attempts {
                        warn!(
                            attempts = attempt,
                            max_attempts,
                            error = %err,
                            "Retry budget exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.calculate_backoff(attempt - 1);
                    debug!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Backoff before retry number `retry` (0-based)
    ///
    /// `initial_backoff * multiplier^retry`, capped at `max_backoff`, then
    /// scaled to 50-100% when jitter is on.
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let base = self.config.initial_backoff_ms as f64
            * self.config.backoff_multiplier.powi(retry as i32);
        let capped = base.min(self.config.max_backoff_ms as f64);

        let delay = if self.config.jitter {
            let jitter = rand::thread_rng().gen_range(0.5..1.0);
            capped * jitter
        } else {
            capped
        };

        Duration::from_secs_f64(delay / 1000.0)
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
