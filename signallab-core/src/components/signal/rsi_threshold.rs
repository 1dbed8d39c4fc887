//! RSI threshold crossings.
//!
//! Oversold fires when RSI drops from at-or-above the threshold to below it.
//! Overbought fires when RSI rises from at-or-below the threshold to above it.

use super::SignalDetector;
use crate::domain::PriceHistory;
use crate::indicators::rsi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiZone {
    Oversold,
    Overbought,
}

#[derive(Debug, Clone)]
pub struct RsiThreshold {
    pub period: usize,
    pub threshold: f64,
    pub zone: RsiZone,
}

impl RsiThreshold {
    pub fn oversold(period: usize, threshold: f64) -> Self {
        Self {
            period,
            threshold,
            zone: RsiZone::Oversold,
        }
    }

    pub fn overbought(period: usize, threshold: f64) -> Self {
        Self {
            period,
            threshold,
            zone: RsiZone::Overbought,
        }
    }
}

impl SignalDetector for RsiThreshold {
    fn name(&self) -> &str {
        match self.zone {
            RsiZone::Oversold => "rsi_oversold",
            RsiZone::Overbought => "rsi_overbought",
        }
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let values = rsi(&history.closes(), self.period);
        let th = self.threshold;
        (0..values.len())
            .map(|i| {
                if i == 0 {
                    return false;
                }
                let (prev, cur) = (values[i - 1], values[i]);
                match self.zone {
                    RsiZone::Oversold => prev >= th && cur < th,
                    RsiZone::Overbought => prev <= th && cur > th,
                }
            })
            .collect()
    }
}
