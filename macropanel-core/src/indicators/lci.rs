//! LCI, Liquidity Cushion Index.
//!
//! `mean(z(RRP / GDP), z(Reserves / GDP))`. Higher means more cushion.

use super::{CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::{mean_strict, ratio};

pub struct Lci;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let i = ctx.inputs;
    let gdp = ctx.column(&i.gdp)?;
    let rrp_gdp = ctx.z(&ratio(ctx.column(&i.rrp)?, gdp));
    let reserves_gdp = ctx.z(&ratio(ctx.column(&i.reserves)?, gdp));
    Ok(IndicatorOutput {
        composite: mean_strict(&[&rrp_gdp, &reserves_gdp]),
        components: vec![("rrp_gdp", rrp_gdp), ("reserves_gdp", reserves_gdp)],
    })
}

impl CompositeIndicator for Lci {
    fn name(&self) -> &'static str {
        "LCI"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![inputs.rrp.clone(), inputs.reserves.clone(), inputs.gdp.clone()]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}
