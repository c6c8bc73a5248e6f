//! Provider trait and structured fetch errors.
//!
//! The `SeriesProvider` trait abstracts over upstream sources (FRED, the NY Fed
//! markets API, OFR-style file drops, market-data charts, BLS) so collectors
//! can drive any of them and tests can substitute in-memory fakes. Providers
//! deliver native values only; no derived transformations happen here.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{Frequency, Series};

/// Optional inclusive date bounds for a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl FetchRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Unbounded on both sides.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Structured error kinds for a single-series fetch.
///
/// Displayable in CLI output and run summaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("no such series: {series_id}")]
    NoSuchSeries { series_id: String },

    #[error("transient fetch error: {0}")]
    Transient(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("permanent fetch error: {0}")]
    Permanent(String),

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("hard stop: provider circuit breaker is open")]
    CircuitOpen,

    #[error("fetch cancelled")]
    Cancelled,

    #[error("operation not supported by provider '{0}'")]
    Unsupported(String),
}

impl FetchError {
    /// Only transient kinds are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn no_such_series(series_id: &str) -> Self {
        Self::NoSuchSeries {
            series_id: series_id.to_string(),
        }
    }
}

/// Upstream metadata for a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub series_id: String,
    pub frequency: Option<Frequency>,
    pub units: Option<String>,
    pub last_updated: Option<NaiveDateTime>,
}

/// Per-id outcomes of a batch fetch, keyed by upstream id.
pub type FetchBatch = BTreeMap<String, Result<Series, FetchError>>;

/// Trait for upstream series providers.
///
/// Implementations handle the specifics of one source. Storage sits above
/// this trait; providers don't know about the store.
pub trait SeriesProvider: Send + Sync {
    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// Fetch one series over an optional date range, sorted ascending.
    fn fetch(&self, series_id: &str, range: &FetchRange) -> Result<Series, FetchError>;

    /// Fetch several series. Partial failure is expected: every requested id
    /// gets its own entry.
    fn fetch_many(&self, series_ids: &[&str], range: &FetchRange) -> FetchBatch {
        series_ids
            .iter()
            .map(|id| (id.to_string(), self.fetch(id, range)))
            .collect()
    }

    /// Native frequency, units and upstream last-update time, when the source
    /// publishes them.
    fn describe(&self, _series_id: &str) -> Result<SeriesMeta, FetchError> {
        Err(FetchError::Unsupported(self.name().to_string()))
    }

    /// False while the provider refuses requests (circuit breaker open).
    fn is_available(&self) -> bool {
        true
    }
}
