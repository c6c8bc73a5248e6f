//! Changes and rebasing: first difference, percent change, year-over-year,
//! index-to-base.

use chrono::NaiveDate;

/// Observations in one trading year; the default lag for `yoy_pct` and the
/// default z-score window.
pub const TRADING_YEAR: usize = 252;

/// First difference `x[t] - x[t-1]`; `NaN` at position 0.
pub fn mom(x: &[f64]) -> Vec<f64> {
    lagged(x, 1, |cur, prev| cur - prev)
}

/// One-period fractional change `x[t] / x[t-1] - 1`; `NaN` on a zero base.
pub fn pct_change(x: &[f64]) -> Vec<f64> {
    lagged(x, 1, |cur, prev| {
        if prev == 0.0 {
            f64::NAN
        } else {
            cur / prev - 1.0
        }
    })
}

/// Percentage change versus `x` shifted by `periods` positions:
/// `100 * (x[t] / x[t-periods] - 1)`.
pub fn yoy_pct(x: &[f64], periods: usize) -> Vec<f64> {
    if periods == 0 {
        return vec![f64::NAN; x.len()];
    }
    lagged(x, periods, |cur, prev| {
        if prev == 0.0 {
            f64::NAN
        } else {
            100.0 * (cur / prev - 1.0)
        }
    })
}

/// Rebase so the value at `base_date` is 100.
///
/// All-`NaN` when `base_date` is not in `dates` or its value is missing or
/// zero. Rebasing uses a single fixed reference, so unlike the trailing
/// transforms the output before `base_date` depends on a later value.
pub fn index_to_base(dates: &[NaiveDate], x: &[f64], base_date: NaiveDate) -> Vec<f64> {
    let base = dates
        .binary_search(&base_date)
        .ok()
        .and_then(|i| x.get(i).copied())
        .filter(|v| v.is_finite() && *v != 0.0);
    match base {
        Some(b) => x.iter().map(|v| 100.0 * v / b).collect(),
        None => vec![f64::NAN; x.len()],
    }
}

fn lagged<F>(x: &[f64], lag: usize, f: F) -> Vec<f64>
where
    F: Fn(f64, f64) -> f64,
{
    let mut result = vec![f64::NAN; x.len()];
    for i in lag..x.len() {
        let (cur, prev) = (x[i], x[i - lag]);
        if cur.is_finite() && prev.is_finite() {
            let v = f(cur, prev);
            result[i] = if v.is_finite() { v } else { f64::NAN };
        }
    }
    result
}
