//! Volume-based detectors.
//!
//! Both return an all-false series when the history has no volume column.

use super::{Direction, SignalDetector};
use crate::domain::PriceHistory;
use crate::indicators::{rolling_max, shift_one, sma};

/// Volume above `threshold` × its own rolling average (the average includes
/// the current bar). With a `price_direction`, the close must also have moved
/// that way against the prior close.
#[derive(Debug, Clone)]
pub struct VolumeSpike {
    pub period: usize,
    pub threshold: f64,
    pub price_direction: Option<Direction>,
}

impl VolumeSpike {
    pub fn new(period: usize, threshold: f64, price_direction: Option<Direction>) -> Self {
        Self {
            period,
            threshold,
            price_direction,
        }
    }
}

impl SignalDetector for VolumeSpike {
    fn name(&self) -> &str {
        "volume_spike"
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let Some(volumes) = history.volumes() else {
            return vec![false; history.len()];
        };
        let closes = history.closes();
        let avg = sma(&volumes, self.period);

        (0..volumes.len())
            .map(|i| {
                let spike = volumes[i] > avg[i] * self.threshold;
                let price_ok = match self.price_direction {
                    None => true,
                    Some(dir) => i > 0 && dir.moved(closes[i - 1], closes[i]),
                };
                spike && price_ok
            })
            .collect()
    }
}

/// Close above the highest high of the prior `price_period` bars, confirmed
/// by volume above `volume_threshold` × its rolling average.
#[derive(Debug, Clone)]
pub struct VolumeBreakout {
    pub price_period: usize,
    pub volume_period: usize,
    pub volume_threshold: f64,
}

impl VolumeBreakout {
    pub fn new(price_period: usize, volume_period: usize, volume_threshold: f64) -> Self {
        Self {
            price_period,
            volume_period,
            volume_threshold,
        }
    }
}

impl SignalDetector for VolumeBreakout {
    fn name(&self) -> &str {
        "volume_breakout"
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let Some(volumes) = history.volumes() else {
            return vec![false; history.len()];
        };
        let closes = history.closes();
        let prior_high = shift_one(&rolling_max(&history.highs(), self.price_period));
        let avg = sma(&volumes, self.volume_period);

        (0..closes.len())
            .map(|i| closes[i] > prior_high[i] && volumes[i] > avg[i] * self.volume_threshold)
            .collect()
    }
}
