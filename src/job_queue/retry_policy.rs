//! Retry policy for failed queue jobs.
//!
//! Implements exponential backoff with configurable parameters.

use crate::background_jobs::JobError;
use crate::config::WorkerSettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries granted to a job before it fails for good.
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    /// Cap for the exponential growth.
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &WorkerSettings) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_secs: config.initial_backoff_secs,
            max_backoff_secs: config.max_backoff_secs,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Backoff for the given retry: `initial_backoff * multiplier^retry_count`,
    /// capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, retry_count: i64) -> u64 {
        let exponent = retry_count.clamp(0, i32::MAX as i64) as i32;
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64) as u64
    }

    /// Unix timestamp at which the retry becomes due.
    pub fn next_retry_at(&self, retry_count: i64) -> i64 {
        chrono::Utc::now().timestamp() + self.backoff_secs(retry_count) as i64
    }

    /// A job that ran `attempts` times and failed with `error` is retried if
    /// the error is transient and the job still has retries left.
    pub fn should_retry(&self, error: &JobError, attempts: i64, max_retries: i64) -> bool {
        error.is_retryable() && attempts <= max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_secs: 10,
            max_backoff_secs: 3600,
            backoff_multiplier: 2.0,
        }
    }
}
