//! Indicator engine: validates the indicator DAG against the master panel
//! and computes every indicator whose inputs are available.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::{
    standard_indicators, CompositeIndicator, IndicatorContext, InputColumns, OmitReason,
    WindowConfig,
};
use crate::domain::{Panel, SchemaError};

/// An indicator that was computed, with the columns it contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedIndicator {
    pub name: String,
    pub columns: Vec<String>,
    pub last_date: Option<NaiveDate>,
    pub last_value: Option<f64>,
    pub nan_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OmittedIndicator {
    pub name: String,
    pub reason: OmitReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    /// Indicators panel over the master panel's index.
    pub panel: Panel,
    pub computed: Vec<ComputedIndicator>,
    pub omitted: Vec<OmittedIndicator>,
}

pub struct IndicatorEngine {
    indicators: Vec<Box<dyn CompositeIndicator>>,
    inputs: InputColumns,
    windows: WindowConfig,
}

impl IndicatorEngine {
    /// Engine over the standard indicator set.
    pub fn new(inputs: InputColumns, windows: WindowConfig) -> Self {
        Self::with_indicators(standard_indicators(), inputs, windows)
    }

    pub fn with_indicators(
        indicators: Vec<Box<dyn CompositeIndicator>>,
        inputs: InputColumns,
        windows: WindowConfig,
    ) -> Self {
        Self {
            indicators,
            inputs,
            windows,
        }
    }

    /// Indicator positions in dependency order. Indicators caught in a
    /// cycle come last, in registration order; `run` omits them.
    fn topological_order(&self) -> Vec<usize> {
        let index: HashMap<&str, usize> = self
            .indicators
            .iter()
            .enumerate()
            .map(|(i, ind)| (ind.name(), i))
            .collect();
        let mut placed = vec![false; self.indicators.len()];
        let mut order = Vec::with_capacity(self.indicators.len());
        loop {
            let next = (0..self.indicators.len()).find(|&i| {
                !placed[i]
                    && self.indicators[i]
                        .depends_on()
                        .iter()
                        .all(|dep| index.get(dep).map_or(true, |&j| placed[j]))
            });
            match next {
                Some(i) => {
                    placed[i] = true;
                    order.push(i);
                }
                None => break,
            }
        }
        order.extend((0..self.indicators.len()).filter(|&i| !placed[i]));
        order
    }

    /// Compute every available indicator over `master`.
    ///
    /// Data problems never fail the run: missing inputs omit the indicator
    /// (and its dependents), degenerate numerics become `NaN` cells.
    pub fn run(&self, master: &Panel) -> Result<EngineReport, SchemaError> {
        master.validate_daily()?;
        let ctx = IndicatorContext::new(master, &self.inputs, &self.windows);
        let mut panel = Panel::new(master.dates().to_vec());
        let mut computed = Vec::new();
        let mut omitted: Vec<OmittedIndicator> = Vec::new();
        let mut done: HashSet<&str> = HashSet::new();

        for i in self.topological_order() {
            let indicator = &self.indicators[i];
            let name = indicator.name();

            let blocked = indicator.depends_on().iter().find(|dep| !done.contains(**dep));
            let missing = indicator
                .required_columns(&self.inputs)
                .into_iter()
                .find(|c| !master.has_column(c));
            let result = match (blocked, missing) {
                (Some(dep), _) => Err(OmitReason::DependencyOmitted(dep.to_string())),
                (None, Some(col)) => Err(OmitReason::MissingColumn(col)),
                (None, None) => indicator.compute(&ctx),
            };

            let output = match result {
                Ok(output) => output,
                Err(reason) => {
                    warn!(indicator = name, %reason, "indicator omitted");
                    omitted.push(OmittedIndicator {
                        name: name.to_string(),
                        reason,
                    });
                    continue;
                }
            };

            let mut columns = vec![name.to_string()];
            panel.push_column(name, output.composite)?;
            for (component, values) in output.components {
                let column = format!("{name}_{component}");
                panel.push_column(column.clone(), values)?;
                columns.push(column);
            }
            for column in &columns {
                if let Some(entry) = panel.column_entry(column) {
                    debug!(column = %column, nan_fraction = entry.nan_fraction(), "indicator column");
                }
            }

            let last = panel.last_valid(name);
            computed.push(ComputedIndicator {
                name: name.to_string(),
                columns,
                last_date: last.map(|(d, _)| d),
                last_value: last.map(|(_, v)| v),
                nan_fraction: panel.column_entry(name).map_or(1.0, |c| c.nan_fraction()),
            });
            done.insert(name);
        }

        info!(
            computed = computed.len(),
            omitted = omitted.len(),
            columns = panel.width(),
            "indicators computed"
        );
        Ok(EngineReport {
            panel,
            computed,
            omitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures::full_master;
    use crate::indicators::IndicatorOutput;

    fn small_windows() -> WindowConfig {
        WindowConfig {
            zscore: 20,
            spread_vol: 10,
            equity_ma: 20,
            equity_vol: 10,
            annualization: 252.0,
        }
    }

    #[test]
    fn full_master_computes_all_eight() {
        let master = full_master(200);
        let report = IndicatorEngine::new(InputColumns::default(), small_windows())
            .run(&master)
            .unwrap();
        assert!(report.omitted.is_empty());
        let names: Vec<_> = report.computed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["LCI", "LFI", "LDI", "YFS", "CLG", "SVI", "EMD", "MRI"]);
        for col in ["LCI_rrp_gdp", "YFS_sofr_effr", "EMD_realized_vol", "MRI_lci", "CLG_lfi"] {
            assert!(report.panel.has_column(col), "missing {col}");
        }
        assert_eq!(report.panel.dates(), master.dates());
        assert!(report.computed.iter().all(|c| c.last_value.is_some()));
    }

    #[test]
    fn missing_column_omits_indicator_and_dependents() {
        let master = full_master(60);
        let without_quits: Vec<&str> = master.column_names().filter(|c| *c != "JTSQUL").collect();
        let master = master.select(&without_quits);
        let report = IndicatorEngine::new(InputColumns::default(), small_windows())
            .run(&master)
            .unwrap();
        let omitted: HashMap<_, _> = report
            .omitted
            .iter()
            .map(|o| (o.name.as_str(), o.reason.clone()))
            .collect();
        assert_eq!(omitted["LFI"], OmitReason::MissingColumn("JTSQUL".into()));
        assert_eq!(omitted["LDI"], OmitReason::MissingColumn("JTSQUL".into()));
        assert_eq!(omitted["CLG"], OmitReason::DependencyOmitted("LFI".into()));
        assert_eq!(omitted["MRI"], OmitReason::DependencyOmitted("LFI".into()));
        assert!(report.panel.has_column("LCI"));
        assert!(!report.panel.has_column("CLG_hy_oas"));
    }

    #[test]
    fn run_is_deterministic() {
        let master = full_master(120);
        let engine = IndicatorEngine::new(InputColumns::default(), small_windows());
        assert_eq!(engine.run(&master).unwrap(), engine.run(&master).unwrap());
    }

    #[test]
    fn no_lookahead_on_truncated_master() {
        let master = full_master(150);
        let engine = IndicatorEngine::new(InputColumns::default(), small_windows());
        let full = engine.run(&master).unwrap().panel;
        let prefix = engine.run(&master.truncated(90)).unwrap().panel;
        assert_eq!(prefix, full.truncated(90));
    }

    struct After;

    impl CompositeIndicator for After {
        fn name(&self) -> &'static str {
            "AFTER"
        }

        fn required_columns(&self, _inputs: &InputColumns) -> Vec<String> {
            Vec::new()
        }

        fn depends_on(&self) -> &'static [&'static str] {
            &["LCI"]
        }

        fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
            Ok(IndicatorOutput {
                composite: vec![0.0; ctx.panel.height()],
                components: Vec::new(),
            })
        }
    }

    #[test]
    fn dependents_run_after_dependencies_regardless_of_registration() {
        let engine = IndicatorEngine::with_indicators(
            vec![Box::new(After), Box::new(crate::indicators::lci::Lci)],
            InputColumns::default(),
            small_windows(),
        );
        let report = engine.run(&full_master(30)).unwrap();
        let names: Vec<_> = report.computed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["LCI", "AFTER"]);
    }

    #[test]
    fn non_daily_master_is_rejected() {
        let master = full_master(10);
        let mut dates = master.dates().to_vec();
        dates[5] = dates[4];
        let broken = Panel::from_parts(dates, master.columns().to_vec()).unwrap();
        assert!(IndicatorEngine::new(InputColumns::default(), small_windows())
            .run(&broken)
            .is_err());
    }
}
