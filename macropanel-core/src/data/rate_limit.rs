//! Token-bucket rate limiter shared by all requests of one adapter.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

/// Requests per second and burst size. A non-positive rate disables limiting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub per_second: f64,
    pub burst: u32,
}

impl RateLimit {
    pub fn new(per_second: f64, burst: u32) -> Self {
        Self { per_second, burst }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0, 1)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    limit: RateLimit,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            bucket: Mutex::new(Bucket {
                tokens: limit.burst.max(1) as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn is_unlimited(&self) -> bool {
        !(self.limit.per_second > 0.0)
    }

    /// Take a token if one is available, otherwise report how long until one is.
    fn take(&self) -> Result<(), Duration> {
        let mut b = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.limit.burst.max(1) as f64;
        let now = Instant::now();
        let refill = now.duration_since(b.last_refill).as_secs_f64() * self.limit.per_second;
        b.tokens = (b.tokens + refill).min(capacity);
        b.last_refill = now;
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - b.tokens) / self.limit.per_second))
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.is_unlimited() || self.take().is_ok()
    }

    /// Block until a token is available. Returns `false` if cancelled while waiting.
    pub fn acquire(&self, cancel: &CancelToken) -> bool {
        if self.is_unlimited() {
            return !cancel.is_cancelled();
        }
        loop {
            match self.take() {
                Ok(()) => return true,
                Err(wait) => {
                    if !cancel.sleep(wait) {
                        return false;
                    }
                }
            }
        }
    }
}
