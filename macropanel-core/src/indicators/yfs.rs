//! YFS, Yield-Funding Stress.
//!
//! `mean(z(-(10Y - 2Y)), z(-(10Y - 3M)), z(SOFR - EFFR))`. Curve spreads
//! are negated so inversions register as stress. The funding component is
//! included only when both SOFR and EFFR columns exist.

use super::{CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::{mean_strict, neg, sub};

pub struct Yfs;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let i = ctx.inputs;
    let y10 = ctx.column(&i.yield_10y)?;
    let curve_10y2y_inv = ctx.z(&neg(&sub(y10, ctx.column(&i.yield_2y)?)));
    let curve_10y3m_inv = ctx.z(&neg(&sub(y10, ctx.column(&i.yield_3m)?)));

    let mut components = vec![
        ("curve_10y2y_inv", curve_10y2y_inv),
        ("curve_10y3m_inv", curve_10y3m_inv),
    ];
    if ctx.has(&i.sofr) && ctx.has(&i.effr) {
        let sofr_effr = ctx.z(&sub(ctx.column(&i.sofr)?, ctx.column(&i.effr)?));
        components.push(("sofr_effr", sofr_effr));
    }
    let parts: Vec<&[f64]> = components.iter().map(|(_, v)| v.as_slice()).collect();
    Ok(IndicatorOutput {
        composite: mean_strict(&parts),
        components,
    })
}

impl CompositeIndicator for Yfs {
    fn name(&self) -> &'static str {
        "YFS"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![inputs.yield_10y.clone(), inputs.yield_2y.clone(), inputs.yield_3m.clone()]
    }

    fn optional_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![inputs.sofr.clone(), inputs.effr.clone()]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures::{full_master, wave};
    use crate::indicators::WindowConfig;
    use crate::transforms::assert_approx;

    #[test]
    fn funding_component_only_with_both_rates() {
        let full = full_master(300);
        let inputs = InputColumns::default();
        let windows = WindowConfig::default();
        let out = compute(&IndicatorContext::new(&full, &inputs, &windows)).unwrap();
        assert_eq!(out.components.len(), 3);

        let no_sofr = full.select(&["DGS10", "DGS2", "DGS3MO", "EFFR"]);
        let out = compute(&IndicatorContext::new(&no_sofr, &inputs, &windows)).unwrap();
        let names: Vec<_> = out.components.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["curve_10y2y_inv", "curve_10y3m_inv"]);
        let mean = (out.components[0].1[299] + out.components[1].1[299]) / 2.0;
        assert_approx(out.composite[299], mean, 1e-12);
    }

    #[test]
    fn inversion_raises_stress() {
        let n = 40;
        let y2 = wave(n, 4.0, 0.5);
        // 10y falls through the 2y over the last days
        let y10: Vec<f64> = (0..n).map(|t| if t < 35 { 4.5 + 0.01 * (t as f64).sin() } else { 3.5 }).collect();
        let p = crate::indicators::fixtures::panel(n, &[("DGS10", y10), ("DGS2", y2), ("DGS3MO", wave(n, 5.0, 0.9))]);
        let inputs = InputColumns::default();
        let windows = WindowConfig {
            zscore: 20,
            ..Default::default()
        };
        let out = compute(&IndicatorContext::new(&p, &inputs, &windows)).unwrap();
        assert!(out.components[0].1[35] > 1.0);
    }
}
