//! Bollinger Bands — moving average +/- standard deviation multiplier.
//!
//! - Middle: SMA(close, period)
//! - Upper: middle + k * stddev(close, period)
//! - Lower: middle - k * stddev(close, period)
//!
//! Uses the sample stddev (divide by N - 1). Lookback: period - 1.

use super::sma::{rolling_std, sma};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// Band width as a fraction of the middle band.
    pub fn width(&self) -> Vec<f64> {
        self.upper
            .iter()
            .zip(&self.lower)
            .zip(&self.middle)
            .map(|((u, l), m)| if *m == 0.0 { f64::NAN } else { (u - l) / m })
            .collect()
    }
}

pub fn bollinger(closes: &[f64], period: usize, k: f64) -> BollingerBands {
    let middle = sma(closes, period);
    let std = rolling_std(closes, period);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + k * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - k * s).collect();
    BollingerBands {
        upper,
        middle,
        lower,
    }
}
