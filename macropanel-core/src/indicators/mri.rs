//! MRI, Macro Risk Index.
//!
//! `z(LFI - LDI + z(HY_OAS) + EMD + YFS - LCI)`. Components are the signed
//! terms of the sum, each recomposed from the master panel.

use super::{
    emd, lci, ldi, lfi, sum_strict, yfs, CompositeIndicator, IndicatorContext, IndicatorOutput,
    InputColumns, OmitReason,
};
use crate::transforms::neg;

pub struct Mri;

pub fn compute(ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
    let lfi = lfi::compute(ctx)?.composite;
    let ldi = neg(&ldi::compute(ctx)?.composite);
    let hy_oas = ctx.z(ctx.column(&ctx.inputs.hy_oas)?);
    let emd = emd::compute(ctx)?.composite;
    let yfs = yfs::compute(ctx)?.composite;
    let lci = neg(&lci::compute(ctx)?.composite);

    let total = sum_strict(&[&lfi, &ldi, &hy_oas, &emd, &yfs, &lci]);
    Ok(IndicatorOutput {
        composite: ctx.z(&total),
        components: vec![
            ("lfi", lfi),
            ("ldi", ldi),
            ("hy_oas", hy_oas),
            ("emd", emd),
            ("yfs", yfs),
            ("lci", lci),
        ],
    })
}

impl CompositeIndicator for Mri {
    fn name(&self) -> &'static str {
        "MRI"
    }

    fn required_columns(&self, inputs: &InputColumns) -> Vec<String> {
        let mut cols = vec![inputs.hy_oas.clone()];
        for part in [
            lfi::Lfi.required_columns(inputs),
            ldi::Ldi.required_columns(inputs),
            emd::Emd.required_columns(inputs),
            yfs::Yfs.required_columns(inputs),
            lci::Lci.required_columns(inputs),
        ] {
            for col in part {
                if !cols.contains(&col) {
                    cols.push(col);
                }
            }
        }
        cols
    }

    fn optional_columns(&self, inputs: &InputColumns) -> Vec<String> {
        yfs::Yfs.optional_columns(inputs)
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["LFI", "LDI", "YFS", "EMD", "LCI"]
    }

    fn compute(&self, ctx: &IndicatorContext<'_>) -> Result<IndicatorOutput, OmitReason> {
        compute(ctx)
    }
}
