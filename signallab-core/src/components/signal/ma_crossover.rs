//! Moving average crossover — golden cross and dead cross detection.
//!
//! Golden: SMA(short) goes from at-or-below SMA(long) to above it.
//! Dead: SMA(short) goes from at-or-above SMA(long) to below it.

use super::{crossed_above, crossed_below, SignalDetector};
use crate::domain::PriceHistory;
use crate::indicators::sma;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossKind {
    Golden,
    Dead,
}

#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub short: usize,
    pub long: usize,
    pub kind: CrossKind,
}

impl MaCrossover {
    pub fn new(short: usize, long: usize, kind: CrossKind) -> Self {
        Self { short, long, kind }
    }

    pub fn golden(short: usize, long: usize) -> Self {
        Self::new(short, long, CrossKind::Golden)
    }

    pub fn dead(short: usize, long: usize) -> Self {
        Self::new(short, long, CrossKind::Dead)
    }
}

impl SignalDetector for MaCrossover {
    fn name(&self) -> &str {
        match self.kind {
            CrossKind::Golden => "golden_cross",
            CrossKind::Dead => "dead_cross",
        }
    }

    fn detect(&self, history: &PriceHistory) -> Vec<bool> {
        let closes = history.closes();
        let fast = sma(&closes, self.short);
        let slow = sma(&closes, self.long);
        match self.kind {
            CrossKind::Golden => crossed_above(&fast, &slow),
            CrossKind::Dead => crossed_below(&fast, &slow),
        }
    }
}
