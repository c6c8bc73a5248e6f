//! Transform library.
//!
//! Pure, stateless functions over an ordered `f64` sequence aligned to a
//! panel's date index. Every function returns a vector of the same length as
//! its input, tolerates `NaN` without panicking, and never looks ahead:
//! output position `t` depends only on input positions `<= t` (the global
//! z-score is the one documented exception).
//!
//! Window policy: a trailing window containing fewer than `window` finite
//! points yields `NaN` at that position.

pub mod arith;
pub mod change;
pub mod rolling;
pub mod zscore;

pub use arith::{add, mean_strict, neg, ratio, sub};
pub use change::{index_to_base, mom, pct_change, yoy_pct, TRADING_YEAR};
pub use rolling::{ma, rolling_std, rolling_vol, VolBasis};
pub use zscore::{zscore, ZWindow};

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for transform tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
