//! Collector: drives one source's adapter over its catalog and publishes a
//! raw snapshot.
//!
//! A single series failure is recorded and collection continues. Failure of
//! a `required` series, a cancelled run, or an adapter that cannot run while
//! required entries depend on it publish nothing for the source.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::catalog::{CatalogEntry, SourceCatalog};
use super::provider::{FetchError, FetchRange, SeriesProvider};
use super::store::{DataStore, PublishedRaw, StorageError, StorageFormat};
use crate::cancel::CancelToken;
use crate::domain::{RawSnapshot, Series, SourceTag};

pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Outcome for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeriesStatus {
    Fetched { points: usize },
    Failed { error: String },
    Skipped { reason: String },
}

impl SeriesStatus {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesReport {
    pub name: String,
    pub upstream_id: String,
    pub required: bool,
    pub status: SeriesStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectReport {
    pub source: SourceTag,
    pub series: Vec<SeriesReport>,
    pub published: Option<PublishedRaw>,
}

impl CollectReport {
    pub fn fetched(&self) -> usize {
        self.count(|s| matches!(s, SeriesStatus::Fetched { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SeriesStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, SeriesStatus::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&SeriesStatus) -> bool) -> usize {
        self.series.iter().filter(|r| pred(&r.status)).count()
    }

    /// Required entries that were not fetched.
    pub fn missing_required(&self) -> Vec<String> {
        self.series
            .iter()
            .filter(|r| r.required && !r.status.is_fetched())
            .map(|r| r.name.clone())
            .collect()
    }

    /// Log a one-line summary of the source.
    pub fn log_summary(&self) {
        info!(
            source = %self.source,
            fetched = self.fetched(),
            failed = self.failed(),
            skipped = self.skipped(),
            published = self.published.is_some(),
            "collection finished"
        );
    }
}

/// Sidecar written next to `<source>_raw_latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub source: SourceTag,
    pub fetched_at: NaiveDateTime,
    pub run_stamp: String,
    pub format: StorageFormat,
    pub rows: usize,
    pub columns: Vec<String>,
    pub content_hash: String,
    pub series: Vec<SeriesReport>,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("source '{}': required series not collected: {}", .report.source, .names.join(", "))]
    RequiredSeriesMissing {
        names: Vec<String>,
        report: Box<CollectReport>,
    },

    #[error("source '{}': adapter unavailable for required series: {reason}", .report.source)]
    AdapterUnavailable {
        reason: String,
        report: Box<CollectReport>,
    },

    #[error("source '{}': collection cancelled", .report.source)]
    Cancelled { report: Box<CollectReport> },

    #[error("source '{}': no series collected", .report.source)]
    NoData { report: Box<CollectReport> },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CollectError {
    /// Per-series statuses gathered before the failure, when there are any.
    pub fn report(&self) -> Option<&CollectReport> {
        match self {
            Self::RequiredSeriesMissing { report, .. }
            | Self::AdapterUnavailable { report, .. }
            | Self::Cancelled { report }
            | Self::NoData { report } => Some(report),
            Self::Storage(_) => None,
        }
    }
}

/// The adapter for a source, or why there is none.
pub enum ProviderSlot<'a> {
    Ready(&'a dyn SeriesProvider),
    Unavailable(String),
}

/// Progress callbacks for a collection run.
pub trait CollectProgress {
    fn on_batch(&self, source: &SourceTag, batch: usize, batches: usize, size: usize);

    fn on_series(&self, source: &SourceTag, report: &SeriesReport);

    fn on_source_complete(&self, report: &CollectReport);
}

/// Reports progress through `tracing`.
pub struct LogProgress;

impl CollectProgress for LogProgress {
    fn on_batch(&self, source: &SourceTag, batch: usize, batches: usize, size: usize) {
        debug!(source = %source, batch = batch + 1, batches, size, "fetching batch");
    }

    fn on_series(&self, source: &SourceTag, report: &SeriesReport) {
        match &report.status {
            SeriesStatus::Fetched { points } => {
                debug!(source = %source, series = %report.name, points, "fetched")
            }
            SeriesStatus::Failed { error } => {
                warn!(source = %source, series = %report.name, required = report.required, %error, "fetch failed")
            }
            SeriesStatus::Skipped { reason } => {
                debug!(source = %source, series = %report.name, %reason, "skipped")
            }
        }
    }

    fn on_source_complete(&self, report: &CollectReport) {
        report.log_summary();
    }
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub range: FetchRange,
    pub batch_size: usize,
    /// Timestamp component of the raw snapshot name.
    pub run_stamp: String,
    pub fetched_at: NaiveDateTime,
}

pub struct Collector<'a> {
    store: &'a DataStore,
    options: CollectOptions,
    cancel: CancelToken,
    progress: &'a dyn CollectProgress,
}

impl<'a> Collector<'a> {
    pub fn new(
        store: &'a DataStore,
        options: CollectOptions,
        cancel: CancelToken,
        progress: &'a dyn CollectProgress,
    ) -> Self {
        Self {
            store,
            options,
            cancel,
            progress,
        }
    }

    /// Collect one source and publish its raw snapshot.
    pub fn collect(&self, provider: ProviderSlot<'_>, catalog: &SourceCatalog) -> Result<CollectReport, CollectError> {
        let source = &catalog.source;
        let mut statuses: Vec<SeriesReport> = catalog
            .series
            .iter()
            .map(|e| report_for(e, SeriesStatus::Skipped { reason: "disabled".into() }))
            .collect();
        let enabled: Vec<usize> = catalog
            .series
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled)
            .map(|(i, _)| i)
            .collect();

        let provider = match provider {
            ProviderSlot::Ready(p) => p,
            ProviderSlot::Unavailable(reason) => {
                for &i in &enabled {
                    statuses[i].status = SeriesStatus::Skipped {
                        reason: reason.clone(),
                    };
                }
                let report = self.finish(source, statuses, None);
                return Err(if catalog.has_required() {
                    CollectError::AdapterUnavailable {
                        reason,
                        report: Box::new(report),
                    }
                } else {
                    warn!(source = %source, %reason, "adapter unavailable, source skipped");
                    CollectError::NoData {
                        report: Box::new(report),
                    }
                });
            }
        };

        let mut fetched: Vec<Series> = Vec::new();
        let mut cancelled = false;
        let batch_size = self.options.batch_size.max(1);
        let batches: Vec<&[usize]> = enabled.chunks(batch_size).collect();

        for (b, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                for &i in batches[b..].iter().flat_map(|c| c.iter()) {
                    statuses[i].status = SeriesStatus::Skipped {
                        reason: "cancelled".into(),
                    };
                }
                break;
            }
            if !provider.is_available() {
                for &i in batches[b..].iter().flat_map(|c| c.iter()) {
                    statuses[i].status = SeriesStatus::Failed {
                        error: FetchError::CircuitOpen.to_string(),
                    };
                    self.progress.on_series(source, &statuses[i]);
                }
                break;
            }

            self.progress.on_batch(source, b, batches.len(), batch.len());
            // several logical names may share one upstream id
            let mut ids: Vec<&str> = Vec::with_capacity(batch.len());
            for &i in batch.iter() {
                let id = catalog.series[i].upstream_id.as_str();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            let results = provider.fetch_many(&ids, &self.options.range);

            for &i in batch.iter() {
                let entry = &catalog.series[i];
                let result = results
                    .get(&entry.upstream_id)
                    .cloned()
                    .unwrap_or_else(|| Err(FetchError::no_such_series(&entry.upstream_id)));
                statuses[i].status = match result {
                    Ok(series) if series.observed_count() == 0 => SeriesStatus::Failed {
                        error: "no observations".into(),
                    },
                    Ok(series) => {
                        let points = series.observed_count();
                        let mut series = series.renamed(entry.name.clone());
                        series.source = source.clone();
                        fetched.push(series);
                        SeriesStatus::Fetched { points }
                    }
                    Err(FetchError::Cancelled) => {
                        cancelled = true;
                        SeriesStatus::Skipped {
                            reason: "cancelled".into(),
                        }
                    }
                    Err(e) => SeriesStatus::Failed {
                        error: e.to_string(),
                    },
                };
                self.progress.on_series(source, &statuses[i]);
            }
        }

        if cancelled {
            let report = self.finish(source, statuses, None);
            return Err(CollectError::Cancelled {
                report: Box::new(report),
            });
        }

        let probe = CollectReport {
            source: source.clone(),
            series: statuses,
            published: None,
        };
        let missing = probe.missing_required();
        if !missing.is_empty() {
            let report = self.finish(source, probe.series, None);
            return Err(CollectError::RequiredSeriesMissing {
                names: missing,
                report: Box::new(report),
            });
        }
        if fetched.is_empty() {
            let report = self.finish(source, probe.series, None);
            warn!(source = %source, "no series collected, nothing published");
            return Err(CollectError::NoData {
                report: Box::new(report),
            });
        }

        let raw = RawSnapshot::from_series(&fetched);
        let published = self
            .store
            .publish_raw(source, &raw, &self.options.run_stamp)?;
        let meta = SnapshotMeta {
            source: source.clone(),
            fetched_at: self.options.fetched_at,
            run_stamp: self.options.run_stamp.clone(),
            format: self.store.format(),
            rows: raw.height(),
            columns: raw.column_names().map(str::to_string).collect(),
            content_hash: published.content_hash.clone(),
            series: probe.series.clone(),
        };
        self.store.write_raw_meta(source, &meta)?;

        Ok(self.finish(source, probe.series, Some(published)))
    }

    fn finish(&self, source: &SourceTag, series: Vec<SeriesReport>, published: Option<PublishedRaw>) -> CollectReport {
        let report = CollectReport {
            source: source.clone(),
            series,
            published,
        };
        self.progress.on_source_complete(&report);
        report
    }
}

fn report_for(entry: &CatalogEntry, status: SeriesStatus) -> SeriesReport {
    SeriesReport {
        name: entry.name.clone(),
        upstream_id: entry.upstream_id.clone(),
        required: entry.required,
        status,
    }
}
