//! SVI, Spread-Volatility Imbalance.
//!
//! `z(HY_OAS) / z(rolling_std(HY_OAS, 30))`. A zero volatility z-score
//! yields `NaN`.

use super::{CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::{ratio, rolling_std};

pub struct Svi;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let level = ctx.column(&ctx.inputs.hy_oas)?;
    let hy_oas = ctx.z(level);
    let hy_oas_vol = ctx.z(&rolling_std(level, ctx.windows.spread_vol));
    Ok(IndicatorOutput {
        composite: ratio(&hy_oas, &hy_oas_vol),
        components: vec![("hy_oas", hy_oas), ("hy_oas_vol", hy_oas_vol)],
    })
}

impl CompositeIndicator for Svi {
    fn name(&self) -> &'static str {
        "SVI"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![inputs.hy_oas.clone()]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}
