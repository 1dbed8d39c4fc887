//! Bollinger band breakout and squeeze-release detectors.

use super::{Direction, SignalDetector};
use crate::domain::PriceHistory;
use crate::indicators::bollinger;

/// Close crosses outside a band.
///
/// Up: close goes from at-or-below the upper band to above it.
/// Down: close goes from at-or-above the lower band to below it.
#[derive(Debug, Clone)]
pub struct BollingerBreakout {
    pub period: usize,
    pub std_dev: f64,
    pub direction: Direction,
}

impl BollingerBreakout {
    pub fn new(period: usize, std_dev: f64, direction: Direction) -> Self {
        Self {
            period,
            std_dev,
            direction,
        }
    }
}

impl SignalDetector for BollingerBreakout {
    fn name(&self) -> &str {
        "bollinger_breakout"
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let closes = history.closes();
        let bands = bollinger(&closes, self.period, self.std_dev);
        (0..closes.len())
            .map(|i| {
                if i == 0 {
                    return false;
                }
                match self.direction {
                    Direction::Up => {
                        closes[i - 1] <= bands.upper[i - 1] && closes[i] > bands.upper[i]
                    }
                    Direction::Down => {
                        closes[i - 1] >= bands.lower[i - 1] && closes[i] < bands.lower[i]
                    }
                }
            })
            .collect()
    }
}

/// Squeeze release.
///
/// Fires when the band width (as a fraction of the middle band) was below
/// `squeeze_threshold` on the prior bar, is wider now than on the prior bar,
/// and the close moved in `direction` against the prior close.
#[derive(Debug, Clone)]
pub struct BollingerSqueeze {
    pub period: usize,
    pub std_dev: f64,
    pub squeeze_threshold: f64,
    pub direction: Direction,
}

impl BollingerSqueeze {
    pub fn new(period: usize, std_dev: f64, squeeze_threshold: f64, direction: Direction) -> Self {
        Self {
            period,
            std_dev,
            squeeze_threshold,
            direction,
        }
    }
}

impl SignalDetector for BollingerSqueeze {
    fn name(&self) -> &str {
        "bollinger_squeeze"
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let closes = history.closes();
        let width = bollinger(&closes, self.period, self.std_dev).width();
        (0..closes.len())
            .map(|i| {
                i > 0
                    && width[i - 1] < self.squeeze_threshold
                    && width[i] > width[i - 1]
                    && self.direction.moved(closes[i - 1], closes[i])
            })
            .collect()
    }
}
