//! Composite macro indicators.
//!
//! Each indicator is an equal-weighted combination of z-scored component
//! expressions over master-panel columns. Indicators never read engine
//! output: CLG and MRI recompose their inputs by calling the same pure
//! composite functions on the master panel. The engine emits every composite
//! as a column named after it plus one `<name>_<component>` column per
//! component.
//!
//! No indicator value at row `t` depends on master-panel rows after `t`.

pub mod clg;
pub mod emd;
pub mod engine;
pub mod lci;
pub mod ldi;
pub mod lfi;
pub mod mri;
pub mod svi;
pub mod yfs;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Panel;
use crate::transforms::{zscore, ZWindow};

pub use engine::{ComputedIndicator, EngineReport, IndicatorEngine, OmittedIndicator};

/// Binds the roles indicators need to master-panel column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputColumns {
    pub rrp: String,
    pub reserves: String,
    pub gdp: String,
    pub long_term_unemployed: String,
    pub unemployed: String,
    pub quits_rate: String,
    pub hires: String,
    pub quits: String,
    pub layoffs: String,
    pub yield_10y: String,
    pub yield_2y: String,
    pub yield_3m: String,
    pub sofr: String,
    pub effr: String,
    pub hy_oas: String,
    pub equity: String,
}

impl Default for InputColumns {
    /// FRED series ids.
    fn default() -> Self {
        Self {
            rrp: "RRPONTSYD".into(),
            reserves: "WRESBAL".into(),
            gdp: "GDP".into(),
            long_term_unemployed: "UEMP27OV".into(),
            unemployed: "UNEMPLOY".into(),
            quits_rate: "JTSQUR".into(),
            hires: "JTSHIL".into(),
            quits: "JTSQUL".into(),
            layoffs: "JTSLDL".into(),
            yield_10y: "DGS10".into(),
            yield_2y: "DGS2".into(),
            yield_3m: "DGS3MO".into(),
            sofr: "SOFR".into(),
            effr: "EFFR".into(),
            hy_oas: "BAMLH0A0HYM2".into(),
            equity: "SP500".into(),
        }
    }
}

/// Window lengths, in panel rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Trailing z-score window.
    pub zscore: usize,
    /// SVI: rolling std of HY OAS levels.
    pub spread_vol: usize,
    /// EMD: moving average of the equity index.
    pub equity_ma: usize,
    /// EMD: realized volatility of equity returns.
    pub equity_vol: usize,
    pub annualization: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            zscore: 252,
            spread_vol: 30,
            equity_ma: 200,
            equity_vol: 30,
            annualization: 252.0,
        }
    }
}

/// Why an indicator was not computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum OmitReason {
    MissingColumn(String),
    DependencyOmitted(String),
}

impl fmt::Display for OmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn(c) => write!(f, "missing column '{c}'"),
            Self::DependencyOmitted(d) => write!(f, "dependency '{d}' omitted"),
        }
    }
}

/// Read-only view handed to `CompositeIndicator::compute`.
pub struct IndicatorContext<'a> {
    pub panel: &'a Panel,
    pub inputs: &'a InputColumns,
    pub windows: &'a WindowConfig,
}

impl<'a> IndicatorContext<'a> {
    pub fn new(panel: &'a Panel, inputs: &'a InputColumns, windows: &'a WindowConfig) -> Self {
        Self {
            panel,
            inputs,
            windows,
        }
    }

    /// A master-panel column by name.
    pub fn column(&self, name: &str) -> Result<&'a [f64], OmitReason> {
        self.panel
            .column(name)
            .ok_or_else(|| OmitReason::MissingColumn(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.panel.has_column(name)
    }

    /// Trailing z-score over the configured window.
    pub fn z(&self, x: &[f64]) -> Vec<f64> {
        zscore(x, ZWindow::Trailing(self.windows.zscore))
    }
}

/// A composite and its named components (names without the indicator
/// prefix).
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOutput {
    pub composite: Vec<f64>,
    pub components: Vec<(&'static str, Vec<f64>)>,
}

pub trait CompositeIndicator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Master-panel columns without which the indicator is omitted.
    fn required_columns(&self, inputs: &InputColumns) -> Vec<String>;

    /// Columns used when present.
    fn optional_columns(&self, _inputs: &InputColumns) -> Vec<String> {
        Vec::new()
    }

    /// Indicators this one recomposes.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason>;
}

/// The eight standard indicators in dependency order.
pub fn standard_indicators() -> Vec<Box<dyn CompositeIndicator>> {
    vec![
        Box::new(lci::Lci),
        Box::new(lfi::Lfi),
        Box::new(ldi::Ldi),
        Box::new(yfs::Yfs),
        Box::new(clg::Clg),
        Box::new(svi::Svi),
        Box::new(emd::Emd),
        Box::new(mri::Mri),
    ]
}

/// Element-wise sum; `NaN` where any term is missing.
pub(crate) fn sum_strict(terms: &[&[f64]]) -> Vec<f64> {
    let Some(first) = terms.first() else {
        return Vec::new();
    };
    let mut out = first.to_vec();
    for term in &terms[1..] {
        for (acc, v) in out.iter_mut().zip(term.iter()) {
            *acc += v;
        }
    }
    out.iter()
        .map(|v| if v.is_finite() { *v } else { f64::NAN })
        .collect()
}
