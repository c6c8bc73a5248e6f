//! EMD, Equity Momentum Divergence.
//!
//! `z((SP500 - MA200) / realized_vol)`, where realized vol is the 30-row
//! sample std of daily percent returns annualised by `sqrt(252)`.

use super::{CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::{ma, ratio, rolling_vol, sub, VolBasis};

pub struct Emd;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let w = ctx.windows;
    let equity = ctx.column(&ctx.inputs.equity)?;
    let realized_vol = rolling_vol(equity, w.equity_vol, VolBasis::PctChange, w.annualization);
    let ma_gap = ratio(&sub(equity, &ma(equity, w.equity_ma)), &realized_vol);
    Ok(IndicatorOutput {
        composite: ctx.z(&ma_gap),
        components: vec![("ma_gap", ma_gap), ("realized_vol", realized_vol)],
    })
}

impl CompositeIndicator for Emd {
    fn name(&self) -> &'static str {
        "EMD"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![inputs.equity.clone()]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}
