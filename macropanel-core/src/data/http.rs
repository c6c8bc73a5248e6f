//! Shared blocking HTTP plumbing for the web adapters.
//!
//! One `HttpClient` per adapter: it owns the reqwest client (bounded
//! timeout), the retry policy, the token bucket and the circuit breaker, and
//! maps HTTP statuses onto `FetchError` kinds.

use rayon::prelude::*;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{FetchBatch, FetchError};
use super::rate_limit::{RateLimit, TokenBucket};
use super::retry::RetryPolicy;
use crate::cancel::CancelToken;
use crate::domain::Series;

const USER_AGENT: &str = concat!("macropanel/", env!("CARGO_PKG_VERSION"));

/// Default wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Per-adapter HTTP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimit,
    pub max_concurrency: usize,
    pub breaker_cooldown_secs: u64,
    pub breaker_threshold: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            rate_limit: RateLimit::new(2.0, 4),
            max_concurrency: 4,
            breaker_cooldown_secs: 300,
            breaker_threshold: 5,
        }
    }
}

#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    cancel: CancelToken,
    max_concurrency: usize,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings, cancel: CancelToken) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            retry: settings.retry.clone(),
            limiter: TokenBucket::new(settings.rate_limit),
            breaker: CircuitBreaker::new(
                Duration::from_secs(settings.breaker_cooldown_secs),
                settings.breaker_threshold,
            ),
            cancel,
            max_concurrency: settings.max_concurrency.max(1),
        })
    }

    pub fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// GET `url` with query parameters and decode the JSON body.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        series_id: &str,
    ) -> Result<T, FetchError> {
        self.execute(series_id, || self.client.get(url).query(query))
    }

    /// POST a JSON body to `url` and decode the JSON response.
    pub fn post_json<B, T>(&self, url: &str, body: &B, series_id: &str) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(series_id, || self.client.post(url).json(body))
    }

    fn execute<T, F>(&self, series_id: &str, build: F) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        self.retry.run(series_id, &self.cancel, |attempt| {
            if !self.breaker.is_allowed() {
                return Err(FetchError::CircuitOpen);
            }
            if !self.limiter.acquire(&self.cancel) {
                return Err(FetchError::Cancelled);
            }
            debug!(series_id, attempt, "http request");

            let resp = build().send().map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    self.breaker.record_failure();
                }
                FetchError::Transient(format!("request for {series_id} failed: {e}"))
            })?;

            let status = resp.status();
            if status.is_success() {
                let body = resp
                    .text()
                    .map_err(|e| FetchError::Transient(format!("reading body for {series_id}: {e}")))?;
                let parsed = serde_json::from_str(&body).map_err(|e| {
                    FetchError::Permanent(format!("malformed response for {series_id}: {e}"))
                })?;
                self.breaker.record_success();
                return Ok(parsed);
            }

            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = resp.text().unwrap_or_default();
            Err(classify_status(status, retry_after, &body, series_id, &self.breaker))
        })
    }

    /// Run `fetch` for every id on a bounded pool of `max_concurrency` threads.
    pub fn fetch_parallel<F>(&self, series_ids: &[&str], fetch: F) -> FetchBatch
    where
        F: Fn(&str) -> Result<Series, FetchError> + Send + Sync,
    {
        let results = self.map_parallel(series_ids, |id| fetch(*id));
        series_ids
            .iter()
            .map(|id| id.to_string())
            .zip(results)
            .collect()
    }

    /// Order-preserving map over `items` on a bounded pool.
    pub fn map_parallel<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Send + Sync,
    {
        if self.max_concurrency <= 1 || items.len() <= 1 {
            return items.iter().map(&f).collect();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_concurrency)
            .build()
        {
            Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            Err(e) => {
                warn!(error = %e, "could not build fetch pool, fetching sequentially");
                items.iter().map(&f).collect()
            }
        }
    }
}

/// Map a non-success status onto a fetch error, feeding the breaker.
fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
    series_id: &str,
    breaker: &CircuitBreaker,
) -> FetchError {
    let lower = body.to_ascii_lowercase();
    match status {
        StatusCode::FORBIDDEN => {
            breaker.trip();
            FetchError::Unauthorized(format!("HTTP 403 for {series_id}"))
        }
        StatusCode::UNAUTHORIZED => FetchError::Unauthorized(format!("HTTP 401 for {series_id}")),
        StatusCode::NOT_FOUND => FetchError::no_such_series(series_id),
        StatusCode::TOO_MANY_REQUESTS => {
            breaker.record_failure();
            FetchError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            }
        }
        StatusCode::REQUEST_TIMEOUT => {
            breaker.record_failure();
            FetchError::Transient(format!("HTTP 408 for {series_id}"))
        }
        s if s.is_server_error() => {
            breaker.record_failure();
            FetchError::Transient(format!("HTTP {s} for {series_id}"))
        }
        StatusCode::BAD_REQUEST if lower.contains("does not exist") || lower.contains("not found") => {
            FetchError::no_such_series(series_id)
        }
        StatusCode::BAD_REQUEST if lower.contains("api_key") || lower.contains("api key") => {
            FetchError::Unauthorized(format!("HTTP 400 for {series_id}: credential rejected"))
        }
        s => FetchError::Permanent(format!("HTTP {s} for {series_id}: {}", snippet(body))),
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body[..end].trim()
}
