//! LFI, Labor Fragility Index.
//!
//! `mean(z(LTU / Unemployed), z(-QuitsRate), z(-Hires / Quits))`. Higher
//! means a more fragile labor market.

use super::{CompositeIndicator, IndicatorContext, IndicatorOutput, InputColumns, OmitReason};
use crate::transforms::{mean_strict, neg, ratio};

pub struct Lfi;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let i = ctx.inputs;
    let long_term_share = ctx.z(&ratio(ctx.column(&i.long_term_unemployed)?, ctx.column(&i.unemployed)?));
    let quits_rate_inv = ctx.z(&neg(ctx.column(&i.quits_rate)?));
    let hires_quits_inv = ctx.z(&neg(&ratio(ctx.column(&i.hires)?, ctx.column(&i.quits)?)));
    Ok(IndicatorOutput {
        composite: mean_strict(&[&long_term_share, &quits_rate_inv, &hires_quits_inv]),
        components: vec![
            ("long_term_share", long_term_share),
            ("quits_rate_inv", quits_rate_inv),
            ("hires_quits_inv", hires_quits_inv),
        ],
    })
}

impl CompositeIndicator for Lfi {
    fn name(&self) -> &'static str {
        "LFI"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        vec![
            inputs.long_term_unemployed.clone(),
            inputs.unemployed.clone(),
            inputs.quits_rate.clone(),
            inputs.hires.clone(),
            inputs.quits.clone(),
        ]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}
