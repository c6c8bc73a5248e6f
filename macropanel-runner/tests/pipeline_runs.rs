//! Pipeline plans against stub providers and a temporary store.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use macropanel_core::cancel::CancelToken;
use macropanel_core::data::{
    AdapterKind, CatalogEntry, FetchError, FetchRange, SeriesProvider, SourceCatalog,
    StorageError, StorageFormat,
};
use macropanel_core::domain::{Observation, Panel, Series, SourceTag};
use macropanel_core::indicators::{OmitReason, WindowConfig};
use macropanel_runner::{
    AdapterRegistry, Credentials, Pipeline, PipelineConfig, RunError, SourceOutcome,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Serves fixed daily observations; ids in `failing` return a transient error.
struct Stub {
    data: BTreeMap<String, Vec<Observation>>,
    failing: Vec<String>,
}

impl Stub {
    fn new(ids: &[(&str, f64)], days: usize) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let data = ids
            .iter()
            .enumerate()
            .map(|(k, (id, level))| {
                let obs = start
                    .iter_days()
                    .take(days)
                    .enumerate()
                    .map(|(i, d)| {
                        let t = i as f64;
                        Observation::new(d, level * (1.0 + 0.01 * (t * 0.1 + k as f64).sin()))
                    })
                    .collect();
                (id.to_string(), obs)
            })
            .collect();
        Self {
            data,
            failing: Vec::new(),
        }
    }

    fn failing(mut self, id: &str) -> Self {
        self.failing.push(id.to_string());
        self
    }
}

impl SeriesProvider for Stub {
    fn name(&self) -> &str {
        "stub"
    }

    fn fetch(&self, series_id: &str, _range: &FetchRange) -> Result<Series, FetchError> {
        if self.failing.iter().any(|f| f == series_id) {
            return Err(FetchError::Transient("503 Service Unavailable".into()));
        }
        let obs = self
            .data
            .get(series_id)
            .ok_or_else(|| FetchError::no_such_series(series_id))?;
        Ok(Series::new(
            series_id,
            SourceTag::new("stub").unwrap(),
            None,
            obs.clone(),
        ))
    }
}

const FRED_IDS: [(&str, f64); 6] = [
    ("DGS10", 4.2),
    ("DGS2", 4.6),
    ("BAMLH0A0HYM2", 3.5),
    ("RRPONTSYD", 500.0),
    ("WRESBAL", 3200.0),
    ("GDP", 27000.0),
];

fn fred_stub() -> Stub {
    Stub::new(&FRED_IDS, 120)
}

fn market_stub() -> Stub {
    Stub::new(&[("^GSPC", 4500.0)], 120)
}

fn config(root: &Path) -> PipelineConfig {
    let fred = SourceCatalog {
        source: SourceTag::new("fred").unwrap(),
        adapter: AdapterKind::Fred,
        series: FRED_IDS
            .iter()
            .map(|(id, _)| {
                let entry = CatalogEntry::new(id, id);
                if matches!(*id, "DGS10" | "DGS2") {
                    entry.required()
                } else {
                    entry
                }
            })
            .collect(),
    };
    let market = SourceCatalog {
        source: SourceTag::new("market").unwrap(),
        adapter: AdapterKind::Market,
        series: vec![CatalogEntry::new("SPX", "^GSPC")],
    };
    PipelineConfig {
        data_root: root.to_path_buf(),
        format: StorageFormat::Csv,
        windows: WindowConfig {
            zscore: 20,
            spread_vol: 10,
            equity_ma: 20,
            equity_vol: 10,
            annualization: 252.0,
        },
        sources: vec![fred, market],
        ..PipelineConfig::default()
    }
}

fn pipeline(root: &Path, fred: Stub, market: Stub, hour: u32) -> Pipeline {
    let registry = AdapterRegistry::new()
        .with_provider("fred", Box::new(fred))
        .with_provider("market", Box::new(market));
    Pipeline::new(config(root), registry, CancelToken::new()).with_clock(at(hour))
}

// ── Refresh ──────────────────────────────────────────────────────────

#[test]
fn refresh_publishes_every_tier() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), fred_stub(), market_stub(), 6);
    let summary = p.refresh().unwrap();

    assert!(summary
        .sources
        .iter()
        .all(|s| s.outcome == SourceOutcome::Published));
    assert_eq!(summary.curated.len(), 2);
    let master = summary.master.as_ref().unwrap();
    assert_eq!(master.rows, 120);
    assert_eq!(master.columns, 7);

    let store = p.store();
    assert!(store.raw_stamped_path(&SourceTag::new("fred").unwrap(), "20240501_060000").exists());
    assert!(store.master_panel_path().exists());
    assert!(store.indicators_path().exists());
    assert!(summary.published.contains(&store.master_panel_path()));

    let computed: Vec<_> = summary.indicators.iter().map(|c| c.name.as_str()).collect();
    assert!(computed.contains(&"LCI"));
    let yfs = summary.omitted.iter().find(|o| o.name == "YFS").unwrap();
    assert_eq!(yfs.reason, OmitReason::MissingColumn("DGS3MO".into()));
}

#[test]
fn required_series_failure_preserves_previous_master() {
    let dir = tempfile::tempdir().unwrap();
    pipeline(dir.path(), fred_stub(), market_stub(), 6)
        .refresh()
        .unwrap();

    let p = pipeline(dir.path(), fred_stub().failing("DGS10"), market_stub(), 7);
    let store = p.store();
    let fred = SourceTag::new("fred").unwrap();
    let master_before = fs::read(store.master_panel_path()).unwrap();
    let indicators_before = fs::read(store.indicators_path()).unwrap();
    let raw_before = fs::read(store.raw_latest_path(&fred)).unwrap();

    let err = p.refresh().unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(matches!(&err, RunError::RequiredSeriesMissing { sources, .. } if sources == &["fred"]));

    let summary = err.summary().unwrap();
    let fred_summary = summary.sources.iter().find(|s| s.source == fred).unwrap();
    assert_eq!(fred_summary.outcome, SourceOutcome::RequiredSeriesMissing);
    assert_eq!(fred_summary.missing_required, vec!["DGS10".to_string()]);
    assert!(summary.master.is_none());

    assert_eq!(fs::read(store.master_panel_path()).unwrap(), master_before);
    assert_eq!(fs::read(store.indicators_path()).unwrap(), indicators_before);
    assert_eq!(fs::read(store.raw_latest_path(&fred)).unwrap(), raw_before);
    assert!(!store.raw_stamped_path(&fred, "20240501_070000").exists());
}

#[test]
fn missing_credential_for_required_adapter_is_exit_3() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.sources.truncate(1);
    let cancel = CancelToken::new();
    let registry = AdapterRegistry::build(&config, &Credentials::default(), &cancel);
    let p = Pipeline::new(config, registry, cancel).with_clock(at(6));

    let err = p.refresh().unwrap_err();
    assert_eq!(err.exit_code(), 3);
    let summary = err.summary().unwrap();
    assert_eq!(summary.sources[0].outcome, SourceOutcome::AdapterUnavailable);
    assert_eq!(summary.sources[0].skipped, FRED_IDS.len());
    assert!(!p.store().master_panel_path().exists());
}

#[test]
fn source_refresh_assembles_with_other_curated_panels() {
    let dir = tempfile::tempdir().unwrap();
    pipeline(dir.path(), fred_stub(), market_stub(), 6)
        .refresh()
        .unwrap();

    // fred would fail now, but only market is refreshed
    let p = pipeline(dir.path(), fred_stub().failing("DGS10"), market_stub(), 7);
    let summary = p.refresh_source("market").unwrap();
    assert_eq!(summary.sources.len(), 1);
    assert_eq!(summary.curated.len(), 1);

    let master = p.store().read_master().unwrap();
    assert!(master.has_column("DGS10"));
    assert!(master.has_column("SPX"));
}

#[test]
fn unknown_source_is_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let err = pipeline(dir.path(), fred_stub(), market_stub(), 6)
        .refresh_source("ecb")
        .unwrap_err();
    assert!(matches!(err, RunError::Catalog(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn empty_optional_source_falls_back_to_previous_curated_panel() {
    let dir = tempfile::tempdir().unwrap();
    pipeline(dir.path(), fred_stub(), market_stub(), 6)
        .refresh()
        .unwrap();

    let p = pipeline(dir.path(), fred_stub(), Stub::new(&[], 0), 7);
    let summary = p.refresh().unwrap();
    let market = summary
        .sources
        .iter()
        .find(|s| s.source.as_str() == "market")
        .unwrap();
    assert_eq!(market.outcome, SourceOutcome::NoData);
    assert_eq!(market.failed, 1);
    assert!(p.store().read_master().unwrap().has_column("SPX"));
}

#[test]
fn curated_panels_of_unconfigured_sources_are_not_assembled() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), fred_stub(), market_stub(), 6);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut stale = Panel::daily(start, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
    stale.push_column("ECB_RATE", vec![4.0; 10]).unwrap();
    p.store()
        .write_curated(&SourceTag::new("ecb").unwrap(), &stale)
        .unwrap();

    let summary = p.refresh().unwrap();
    let master = p.store().read_master().unwrap();
    assert!(!master.has_column("ECB_RATE"));
    assert_eq!(summary.master.unwrap().columns, 7);
}

#[test]
fn cancelled_run_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let registry = AdapterRegistry::new()
        .with_provider("fred", Box::new(fred_stub()))
        .with_provider("market", Box::new(market_stub()));
    let p = Pipeline::new(config(dir.path()), registry, cancel).with_clock(at(6));

    let err = p.refresh().unwrap_err();
    assert!(matches!(err, RunError::Cancelled { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(!p.store().master_panel_path().exists());
}

// ── Rebuild ──────────────────────────────────────────────────────────

#[test]
fn rebuild_indicators_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), fred_stub(), market_stub(), 6);
    p.refresh().unwrap();
    let after_refresh = fs::read(p.store().indicators_path()).unwrap();

    let first = p.rebuild_indicators().unwrap();
    let bytes1 = fs::read(p.store().indicators_path()).unwrap();
    p.rebuild_indicators().unwrap();
    let bytes2 = fs::read(p.store().indicators_path()).unwrap();

    assert_eq!(bytes1, bytes2);
    assert_eq!(bytes1, after_refresh);
    assert_eq!(first.command, "rebuild-indicators");
    assert!(first.sources.is_empty());
}

#[test]
fn rebuild_without_master_is_storage_failure() {
    let dir = tempfile::tempdir().unwrap();
    let err = pipeline(dir.path(), fred_stub(), market_stub(), 6)
        .rebuild_indicators()
        .unwrap_err();
    assert!(matches!(err, RunError::Storage(StorageError::NotFound(_))));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn status_lists_published_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), fred_stub(), market_stub(), 6);
    p.refresh().unwrap();
    let status = p.status().unwrap();
    let tiers: Vec<_> = status.tiers.iter().map(|t| t.tier.as_str()).collect();
    assert_eq!(tiers, vec!["raw", "curated", "indicators"]);
    let curated = &status.tiers[1];
    assert!(curated
        .files
        .iter()
        .any(|f| f.path == p.store().master_panel_path() && f.rows == Some(120)));
}
