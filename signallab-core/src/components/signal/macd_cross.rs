//! MACD crossover: MACD line goes from at-or-below its signal line to above it.

use super::{crossed_above, SignalDetector};
use crate::domain::PriceHistory;
use crate::indicators::macd;

#[derive(Debug, Clone)]
pub struct MacdCross {
    pub fast: usize,
    pub slow: usize,
    pub signal_period: usize,
}

impl MacdCross {
    pub fn new(fast: usize, slow: usize, signal_period: usize) -> Self {
        Self {
            fast,
            slow,
            signal_period,
        }
    }
}

impl SignalDetector for MacdCross {
    fn name(&self) -> &str {
        "macd_cross"
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let m = macd(&history.closes(), self.fast, self.slow, self.signal_period);
        crossed_above(&m.macd, &m.signal)
    }
}
