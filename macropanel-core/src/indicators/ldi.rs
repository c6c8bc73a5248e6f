//! LDI, Labor Dynamism Index.
//!
//! `mean(z(QuitsRate), z(Hires / Quits), z(Quits / Layoffs))`. A zero
//! layoffs level is missing, so the last component and the composite are
//! `NaN` there.

use super::{CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::{mean_strict, ratio};

pub struct Ldi;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let i = ctx.inputs;
    let quits = ctx.column(&i.quits)?;
    let quits_rate = ctx.z(ctx.column(&i.quits_rate)?);
    let hires_quits = ctx.z(&ratio(ctx.column(&i.hires)?, quits));
    let quits_layoffs = ctx.z(&ratio(quits, ctx.column(&i.layoffs)?));
    Ok(IndicatorOutput {
        composite: mean_strict(&[&quits_rate, &hires_quits, &quits_layoffs]),
        components: vec![
            ("quits_rate", quits_rate),
            ("hires_quits", hires_quits),
            ("quits_layoffs", quits_layoffs),
        ],
    })
}

impl CompositeIndicator for Ldi {
    fn name(&self) -> &'static str {
        "LDI"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![
            inputs.quits_rate.clone(),
            inputs.hires.clone(),
            inputs.quits.clone(),
            inputs.layoffs.clone(),
        ]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures::{panel, wave};
    use crate::indicators::WindowConfig;

    #[test]
    fn zero_layoffs_window_is_nan() {
        let n = 30;
        let mut layoffs = wave(n, 1600.0, 0.4);
        layoffs[20] = 0.0;
        let p = panel(
            n,
            &[
                ("JTSQUR", wave(n, 2.3, 0.1)),
                ("JTSHIL", wave(n, 5600.0, 0.2)),
                ("JTSQUL", wave(n, 3500.0, 0.3)),
                ("JTSLDL", layoffs),
            ],
        );
        let inputs = InputColumns::default();
        let windows = WindowConfig {
            zscore: 5,
            ..Default::default()
        };
        let out = compute(&IndicatorContext::new(&p, &inputs, &windows)).unwrap();
        let (_, quits_layoffs) = &out.components[2];
        assert!(quits_layoffs[20].is_nan());
        assert!(out.composite[20].is_nan());
        assert!(out.composite[19].is_finite());
        assert!(out.composite[25].is_finite());
    }
}
