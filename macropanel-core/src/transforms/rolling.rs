//! Trailing-window statistics: mean, sample standard deviation, volatility.

use super::change::{mom, pct_change};

/// What `rolling_vol` takes the standard deviation of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolBasis {
    /// First differences (levels such as spreads or yields).
    Diff,
    /// One-period fractional changes (prices).
    PctChange,
}

/// Trailing mean over `window` points; `NaN` until the window is full of
/// finite values.
pub fn ma(x: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(x, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Trailing sample standard deviation (ddof = 1) over `window` points.
///
/// A window of one has no defined sample deviation and yields `NaN`.
pub fn rolling_std(x: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(x, window, sample_std)
}

/// Annualised rolling volatility: the trailing standard deviation of
/// `basis` changes times `sqrt(annualization)`.
pub fn rolling_vol(x: &[f64], window: usize, basis: VolBasis, annualization: f64) -> Vec<f64> {
    let changes = match basis {
        VolBasis::Diff => mom(x),
        VolBasis::PctChange => pct_change(x),
    };
    let scale = annualization.sqrt();
    rolling_std(&changes, window)
        .into_iter()
        .map(|v| v * scale)
        .collect()
}

/// Apply `f` to every full trailing window of finite values.
pub(crate) fn rolling_apply<F>(x: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    // Track the most recent non-finite position so each window is checked in O(1).
    let mut last_bad: Option<usize> = None;
    for i in 0..n {
        if !x[i].is_finite() {
            last_bad = Some(i);
        }
        if i + 1 < window {
            continue;
        }
        let start = i + 1 - window;
        if matches!(last_bad, Some(b) if b >= start) {
            continue;
        }
        result[i] = f(&x[start..=i]);
    }
    result
}

pub(crate) fn sample_std(w: &[f64]) -> f64 {
    let n = w.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = w.iter().sum::<f64>() / n as f64;
    let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}
