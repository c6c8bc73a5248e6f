//! Z-scores, trailing or global.

use serde::{Deserialize, Serialize};

use super::rolling::{rolling_apply, sample_std};

/// Standard deviations this small relative to the mean are treated as zero.
const DEGENERATE_STD: f64 = 1e-12;

/// Normalisation window for `zscore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZWindow {
    /// Right-aligned window of the given length.
    Trailing(usize),
    /// Mean and deviation over every finite value in the input. Looks ahead;
    /// not used by the indicator engine.
    Global,
}

/// `(x - mean) / std` under the chosen window. `NaN` where the deviation is
/// zero or undefined, and wherever `x` itself is missing.
pub fn zscore(x: &[f64], window: ZWindow) -> Vec<f64> {
    match window {
        ZWindow::Trailing(w) => rolling_apply(x, w, |win| {
            let mean = win.iter().sum::<f64>() / win.len() as f64;
            standardise(win[win.len() - 1], mean, sample_std(win))
        }),
        ZWindow::Global => {
            let finite: Vec<f64> = x.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                return vec![f64::NAN; x.len()];
            }
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            let std = sample_std(&finite);
            x.iter()
                .map(|v| {
                    if v.is_finite() {
                        standardise(*v, mean, std)
                    } else {
                        f64::NAN
                    }
                })
                .collect()
        }
    }
}

fn standardise(value: f64, mean: f64, std: f64) -> f64 {
    if !std.is_finite() || std <= DEGENERATE_STD * mean.abs().max(1.0) {
        return f64::NAN;
    }
    (value - mean) / std
}
