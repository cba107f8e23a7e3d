// Retry with exponential backoff for backing-store calls
//
// Rate-limit rejections back off exponentially from their own base delay (or
// wait the server's retry-after hint); other transient failures wait a short
// fixed delay. Non-retryable errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::RetryConfig;
use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    // Helper to calculate exponential backoff with jitter; attempt 0 is the first retry
    pub fn calculate_backoff(retry_attempt: u32, base_ms: u64, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (base_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
            .min(config.max_backoff_ms as f64);

        if config.jitter_factor <= 0.0 {
            return Duration::from_millis(base_backoff_ms as u64);
        }

        // Apply jitter to prevent thundering herd
        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }

    // How long to wait after `err` failed the given (1-based) attempt
    pub fn delay_for(&self, err: &StoreError, attempt: u32) -> Duration {
        match err {
            StoreError::RateLimited { retry_after } => {
                let backoff = Self::calculate_backoff(
                    attempt.saturating_sub(1),
                    self.config.rate_limit_base_delay_ms,
                    &self.config,
                );
                // The server hint only ever lengthens the wait, within the cap
                match retry_after {
                    Some(hint) => (*hint)
                        .max(backoff)
                        .min(Duration::from_millis(self.config.max_backoff_ms)),
                    None => backoff,
                }
            }
            _ => Duration::from_millis(self.config.transient_delay_ms),
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is used up; the last error is returned in the latter case.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    error!("{label}: giving up after {attempt} attempts: {err}");
                    return Err(err);
                }
                Err(err) => {
                    let wait = self.delay_for(&err, attempt);
                    if err.is_rate_limited() {
                        warn!("{label}: attempt {attempt} rate limited, waiting {wait:?}");
                    } else {
                        warn!("{label}: attempt {attempt} failed ({err}), waiting {wait:?}");
                    }
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
