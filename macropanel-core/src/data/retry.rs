//! Exponential backoff with jitter for transient fetch failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::FetchError;
use crate::cancel::CancelToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the computed backoff.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping. Used by tests and the file-drop adapter.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    fn delay_for(&self, retry: u32, err: &FetchError) -> Duration {
        let mut delay = self.backoff(retry);
        if self.jitter > 0.0 && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..self.jitter);
            delay += delay.mul_f64(extra);
        }
        if let FetchError::RateLimited { retry_after_secs } = err {
            let hinted = Duration::from_secs(*retry_after_secs);
            delay = delay.max(hinted.min(Duration::from_millis(self.max_delay_ms)));
        }
        delay
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, what: &str, cancel: &CancelToken, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Result<T, FetchError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt, &e);
                    debug!(what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    if !cancel.sleep(delay) {
                        return Err(FetchError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(what, attempts, error = %e, "giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}
