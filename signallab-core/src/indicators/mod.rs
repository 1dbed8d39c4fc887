//! Indicator series used by the signal detectors.
//!
//! Every function maps a value series to a series of the same length, using
//! only values at or before each index. Positions without enough history are
//! NaN (RSI reports its neutral value instead).

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::{bollinger, BollingerBands};
pub use ema::{ema, ewm};
pub use macd::{macd, Macd};
pub use rsi::{rsi, RSI_NEUTRAL};
pub use sma::{rolling_max, rolling_std, shift_one, sma};

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
