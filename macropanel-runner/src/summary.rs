//! Run summary: what a pipeline run collected, curated and published.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;

use macropanel_core::data::{CollectReport, CurationReport, SeriesReport};
use macropanel_core::domain::{Panel, SourceTag};
use macropanel_core::indicators::{ComputedIndicator, OmittedIndicator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Published,
    NoData,
    RequiredSeriesMissing,
    AdapterUnavailable,
    Cancelled,
}

impl SourceOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::NoData => "no data",
            Self::RequiredSeriesMissing => "REQUIRED MISSING",
            Self::AdapterUnavailable => "ADAPTER UNAVAILABLE",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: SourceTag,
    pub outcome: SourceOutcome,
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub missing_required: Vec<String>,
    pub series: Vec<SeriesReport>,
}

impl SourceSummary {
    pub fn new(report: &CollectReport, outcome: SourceOutcome) -> Self {
        Self {
            source: report.source.clone(),
            outcome,
            fetched: report.fetched(),
            failed: report.failed(),
            skipped: report.skipped(),
            missing_required: report.missing_required(),
            series: report.series.clone(),
        }
    }
}

/// Shape of a published panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelShape {
    pub rows: usize,
    pub columns: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl PanelShape {
    pub fn of(panel: &Panel) -> Self {
        Self {
            rows: panel.height(),
            columns: panel.width(),
            start: panel.start(),
            end: panel.end(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuratedSummary {
    pub source: SourceTag,
    pub shape: PanelShape,
    pub curation: CurationReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub command: String,
    pub started_at: NaiveDateTime,
    pub run_stamp: String,
    pub sources: Vec<SourceSummary>,
    pub curated: Vec<CuratedSummary>,
    pub master: Option<PanelShape>,
    pub indicators: Vec<ComputedIndicator>,
    pub omitted: Vec<OmittedIndicator>,
    pub published: Vec<PathBuf>,
}

impl RunSummary {
    pub fn new(command: impl Into<String>, started_at: NaiveDateTime, run_stamp: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            started_at,
            run_stamp: run_stamp.into(),
            sources: Vec::new(),
            curated: Vec::new(),
            master: None,
            indicators: Vec::new(),
            omitted: Vec::new(),
            published: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text tables for terminal output.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({})", self.command, self.started_at.format("%Y-%m-%d %H:%M:%S"));

        if !self.sources.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{:<12} {:<20} {:>8} {:>7} {:>8}",
                "Source", "Outcome", "Fetched", "Failed", "Skipped"
            );
            let _ = writeln!(out, "{}", "-".repeat(59));
            for s in &self.sources {
                let _ = writeln!(
                    out,
                    "{:<12} {:<20} {:>8} {:>7} {:>8}",
                    s.source.as_str(),
                    s.outcome.label(),
                    s.fetched,
                    s.failed,
                    s.skipped
                );
                if !s.missing_required.is_empty() {
                    let _ = writeln!(out, "  required missing: {}", s.missing_required.join(", "));
                }
            }
        }

        if !self.curated.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{:<12} {:>7} {:>8}  {:<23}", "Curated", "Rows", "Columns", "Range");
            let _ = writeln!(out, "{}", "-".repeat(53));
            for c in &self.curated {
                let _ = writeln!(
                    out,
                    "{:<12} {:>7} {:>8}  {:<23}",
                    c.source.as_str(),
                    c.shape.rows,
                    c.shape.columns,
                    fmt_range(&c.shape)
                );
            }
        }

        if let Some(master) = &self.master {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Master panel: {} rows x {} columns, {}",
                master.rows,
                master.columns,
                fmt_range(master)
            );
        }

        if !self.indicators.is_empty() || !self.omitted.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{:<6} {:>12} {:>12} {:>6}", "Index", "Last", "As of", "NaN%");
            let _ = writeln!(out, "{}", "-".repeat(39));
            for ind in &self.indicators {
                let last = ind
                    .last_value
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
                let as_of = ind
                    .last_date
                    .map_or_else(|| "-".to_string(), |d| d.to_string());
                let _ = writeln!(
                    out,
                    "{:<6} {:>12} {:>12} {:>5.1}%",
                    ind.name,
                    last,
                    as_of,
                    ind.nan_fraction * 100.0
                );
            }
            for o in &self.omitted {
                let _ = writeln!(out, "{:<6} omitted: {}", o.name, o.reason);
            }
        }

        if !self.published.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Published:");
            for path in &self.published {
                let _ = writeln!(out, "  {}", path.display());
            }
        }
        out
    }
}

fn fmt_range(shape: &PanelShape) -> String {
    match (shape.start, shape.end) {
        (Some(s), Some(e)) => format!("{s} to {e}"),
        _ => "(empty)".to_string(),
    }
}
