//! Sequential pipeline plans: refresh (collect, curate, assemble, compute)
//! and rebuild-indicators.
//!
//! Stages run strictly in order. Every collector finishes before curation,
//! curation before assembly, assembly before indicators. A required-series
//! or required-adapter failure in any source stops the plan before assembly,
//! so the previously published master panel and indicators stay in place.

use chrono::{NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use macropanel_core::cancel::CancelToken;
use macropanel_core::data::{
    assemble, curate, run_stamp, Catalog, CatalogError, CollectError, CollectOptions, Collector,
    DataStore, FetchRange, LogProgress, StorageError, StoreStatus,
};
use macropanel_core::domain::{Panel, SchemaError, SourceTag};
use macropanel_core::indicators::IndicatorEngine;

use crate::config::{ConfigError, PipelineConfig};
use crate::registry::AdapterRegistry;
use crate::summary::{CuratedSummary, PanelShape, RunSummary, SourceOutcome, SourceSummary};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("required series missing in: {}; assembly skipped", .sources.join(", "))]
    RequiredSeriesMissing {
        sources: Vec<String>,
        summary: Box<RunSummary>,
    },

    #[error("adapter unavailable for required series in: {}; assembly skipped", .sources.join(", "))]
    AdapterUnavailable {
        sources: Vec<String>,
        summary: Box<RunSummary>,
    },

    #[error("run cancelled")]
    Cancelled { summary: Box<RunSummary> },

    #[error("no curated panels to assemble")]
    NothingToAssemble,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("schema violation: {0}")]
    Schema(#[from] SchemaError),
}

impl RunError {
    /// Process exit status for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RequiredSeriesMissing { .. } => 2,
            Self::AdapterUnavailable { .. } => 3,
            Self::Storage(StorageError::Schema { .. }) => 5,
            Self::Storage(_) => 4,
            Self::Schema(_) => 5,
            Self::Config(_) | Self::Catalog(_) | Self::Cancelled { .. } | Self::NothingToAssemble => 1,
        }
    }

    /// Partial summary of a run that stopped early.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::RequiredSeriesMissing { summary, .. }
            | Self::AdapterUnavailable { summary, .. }
            | Self::Cancelled { summary } => Some(summary),
            _ => None,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    store: DataStore,
    registry: AdapterRegistry,
    cancel: CancelToken,
    clock: Option<NaiveDateTime>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: AdapterRegistry, cancel: CancelToken) -> Self {
        let store = DataStore::new(config.data_root.clone(), config.format);
        Self {
            config,
            store,
            registry,
            cancel,
            clock: None,
        }
    }

    /// Fix the run timestamp (snapshot stamps, metadata) instead of reading
    /// the system clock.
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn now(&self) -> NaiveDateTime {
        self.clock.unwrap_or_else(|| Utc::now().naive_utc())
    }

    /// Collect and curate every source, then assemble and compute.
    pub fn refresh(&self) -> Result<RunSummary, RunError> {
        self.run_refresh("refresh", &self.config.catalog())
    }

    /// Collect and curate one source; assembly uses the latest curated
    /// panels of all sources.
    pub fn refresh_source(&self, source: &str) -> Result<RunSummary, RunError> {
        let catalog = self.config.catalog().only(source)?;
        self.run_refresh(&format!("refresh --source {source}"), &catalog)
    }

    /// Recompute indicators from the published master panel.
    pub fn rebuild_indicators(&self) -> Result<RunSummary, RunError> {
        let started_at = self.now();
        let mut summary = RunSummary::new("rebuild-indicators", started_at, run_stamp(started_at));
        let master = self.store.read_master()?;
        summary.master = Some(PanelShape::of(&master));
        self.compute_indicators(&master, &mut summary)?;
        Ok(summary)
    }

    pub fn status(&self) -> Result<StoreStatus, RunError> {
        Ok(self.store.status()?)
    }

    fn run_refresh(&self, command: &str, catalog: &Catalog) -> Result<RunSummary, RunError> {
        let started_at = self.now();
        let stamp = run_stamp(started_at);
        let mut summary = RunSummary::new(command, started_at, stamp.clone());
        info!(command, sources = catalog.sources.len(), stamp = %stamp, "refresh started");

        // ── Collect ──
        let options = CollectOptions {
            range: FetchRange::new(self.config.history_start, None),
            batch_size: self.config.batch_size,
            run_stamp: stamp,
            fetched_at: started_at,
        };
        let collector = Collector::new(&self.store, options, self.cancel.clone(), &LogProgress);

        let mut published: Vec<SourceTag> = Vec::new();
        let mut required_missing: Vec<String> = Vec::new();
        let mut unavailable: Vec<String> = Vec::new();
        let mut cancelled = false;

        for source in &catalog.sources {
            let tag = &source.source;
            match collector.collect(self.registry.slot(tag.as_str()), source) {
                Ok(report) => {
                    if let Some(raw) = &report.published {
                        summary.published.push(raw.stamped.clone());
                        summary.published.push(raw.latest.clone());
                        summary.published.push(self.store.raw_meta_path(tag));
                    }
                    summary
                        .sources
                        .push(SourceSummary::new(&report, SourceOutcome::Published));
                    published.push(tag.clone());
                }
                Err(CollectError::Storage(e)) => return Err(e.into()),
                Err(err) => {
                    let outcome = match &err {
                        CollectError::RequiredSeriesMissing { .. } => {
                            error!(source = %tag, error = %err, "source failed");
                            required_missing.push(tag.to_string());
                            SourceOutcome::RequiredSeriesMissing
                        }
                        CollectError::AdapterUnavailable { .. } => {
                            error!(source = %tag, error = %err, "source failed");
                            unavailable.push(tag.to_string());
                            SourceOutcome::AdapterUnavailable
                        }
                        CollectError::Cancelled { .. } => {
                            cancelled = true;
                            SourceOutcome::Cancelled
                        }
                        _ => {
                            warn!(source = %tag, error = %err, "source produced no data");
                            SourceOutcome::NoData
                        }
                    };
                    if let Some(report) = err.report() {
                        summary.sources.push(SourceSummary::new(report, outcome));
                    }
                }
            }
            if cancelled {
                warn!("cancelled; remaining sources not collected");
                break;
            }
        }

        // ── Curate ──
        for tag in &published {
            let raw = self.store.read_raw_latest(tag)?;
            let (panel, curation) = curate(&raw)?;
            let path = self.store.write_curated(tag, &panel)?;
            summary.published.push(path);
            summary.curated.push(CuratedSummary {
                source: tag.clone(),
                shape: PanelShape::of(&panel),
                curation,
            });
        }

        if cancelled {
            return Err(RunError::Cancelled {
                summary: Box::new(summary),
            });
        }
        if !required_missing.is_empty() {
            warn!("assembly skipped; previous master panel kept");
            return Err(RunError::RequiredSeriesMissing {
                sources: required_missing,
                summary: Box::new(summary),
            });
        }
        if !unavailable.is_empty() {
            warn!("assembly skipped; previous master panel kept");
            return Err(RunError::AdapterUnavailable {
                sources: unavailable,
                summary: Box::new(summary),
            });
        }

        // ── Assemble ──
        let master = self.assemble_master()?;
        summary.published.push(self.store.write_master(&master)?);
        summary.master = Some(PanelShape::of(&master));

        // ── Indicators ──
        self.compute_indicators(&master, &mut summary)?;
        info!(command, "refresh finished");
        Ok(summary)
    }

    /// Latest curated panel of every configured source, in catalog order.
    fn assemble_master(&self) -> Result<Panel, RunError> {
        let on_disk = self.store.curated_sources()?;
        let mut panels = Vec::new();
        for source in &self.config.sources {
            if on_disk.contains(&source.source) {
                let panel = self.store.read_curated(&source.source)?;
                panels.push((source.source.clone(), panel));
            }
        }
        for tag in &on_disk {
            if !self.config.sources.iter().any(|s| &s.source == tag) {
                debug!(source = %tag, "curated panel for unconfigured source ignored");
            }
        }
        if panels.is_empty() {
            return Err(RunError::NothingToAssemble);
        }
        Ok(assemble(&panels)?)
    }

    fn compute_indicators(&self, master: &Panel, summary: &mut RunSummary) -> Result<(), RunError> {
        let engine = IndicatorEngine::new(self.config.inputs.clone(), self.config.windows);
        let report = engine.run(master)?;
        summary.published.push(self.store.write_indicators(&report.panel)?);
        summary.indicators = report.computed;
        summary.omitted = report.omitted;
        Ok(())
    }
}
