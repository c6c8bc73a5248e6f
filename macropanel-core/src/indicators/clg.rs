//! CLG, Credit-Labor Gap.
//!
//! `z(HY_OAS) - z(LFI)`, with LFI recomposed from the master panel.
//! Negative values mean spreads are priced looser than labor stress implies.

use super::{lfi, CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::sub;

pub struct Clg;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let hy_oas = ctx.z(ctx.column(&ctx.inputs.hy_oas)?);
    let lfi = ctx.z(&lfi::compute(ctx)?.composite);
    Ok(IndicatorOutput {
        composite: sub(&hy_oas, &lfi),
        components: vec![("hy_oas", hy_oas), ("lfi", lfi)],
    })
}

impl CompositeIndicator for Clg {
    fn name(&self) -> &'static str {
        "CLG"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        let mut cols = vec![inputs.hy_oas.clone()];
        cols.extend(lfi::Lfi.required_columns(inputs));
        cols
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["LFI"]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}
