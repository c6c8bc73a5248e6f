//! Element-wise arithmetic with NaN-safe division.

/// `a / b`; `NaN` where the denominator is zero or either side is missing.
/// Never produces an infinity.
pub fn ratio(a: &[f64], b: &[f64]) -> Vec<f64> {
    zip_with(a, b, |x, y| if y == 0.0 { f64::NAN } else { x / y })
}

pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    zip_with(a, b, |x, y| x + y)
}

pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    zip_with(a, b, |x, y| x - y)
}

pub fn neg(a: &[f64]) -> Vec<f64> {
    a.iter().map(|v| -v).collect()
}

/// Row-wise mean of equal-length series; `NaN` for any row where some input
/// is missing (strict join).
pub fn mean_strict(series: &[&[f64]]) -> Vec<f64> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let k = series.len() as f64;
    (0..first.len())
        .map(|i| {
            let mut sum = 0.0;
            for s in series {
                match s.get(i) {
                    Some(v) if v.is_finite() => sum += v,
                    _ => return f64::NAN,
                }
            }
            sum / k
        })
        .collect()
}

fn zip_with<F>(a: &[f64], b: &[f64], f: F) -> Vec<f64>
where
    F: Fn(f64, f64) -> f64,
{
    debug_assert_eq!(a.len(), b.len(), "element-wise inputs must be aligned");
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            if !x.is_finite() || !y.is_finite() {
                return f64::NAN;
            }
            let v = f(x, y);
            if v.is_finite() {
                v
            } else {
                f64::NAN
            }
        })
        .collect()
}
