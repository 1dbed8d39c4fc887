//! Signal detectors — turn a price history into a boolean trigger series.
//!
//! Detectors are pure: `detect` sees only the price history and returns one
//! flag per bar, where bar `i` depends on bars `0..=i` only. Crossing
//! detectors compare the current bar against the prior bar; any comparison
//! involving an undefined (NaN) indicator value is false.

pub mod bollinger;
pub mod ma_crossover;
pub mod macd_cross;
pub mod rsi_threshold;
pub mod volume;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::PriceHistory;

pub use bollinger::{BollingerBreakout, BollingerSqueeze};
pub use ma_crossover::{CrossKind, MaCrossover};
pub use macd_cross::MacdCross;
pub use rsi_threshold::{RsiThreshold, RsiZone};
pub use volume::{VolumeBreakout, VolumeSpike};

/// Price direction used by breakout-style detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `true` when `current` moved from `previous` in this direction.
    pub fn moved(&self, previous: f64, current: f64) -> bool {
        match self {
            Direction::Up => current > previous,
            Direction::Down => current < previous,
        }
    }
}

/// Name plus numeric parameters identifying one detector instance.
///
/// Direction-like parameters are encoded numerically: `1` for up, `-1` for
/// down, `0` for "either" where the detector allows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl SignalConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// A configured signal detector.
pub trait SignalDetector: Send + Sync + fmt::Debug {
    /// Registry name (e.g., "golden_cross").
    fn name(&self) -> &str;

    /// One flag per bar of `history`.
    fn detect(&self, history: &PriceHistory) -> Vec<bool>;
}

/// Combine several detectors with logical OR.
///
/// With no detectors the result is all-false.
pub fn combine_any(detectors: &[Box<dyn SignalDetector>], history: &PriceHistory) -> Vec<bool> {
    let mut combined = vec![false; history.len()];
    for detector in detectors {
        let flags = detector.detect(history);
        for (slot, flag) in combined.iter_mut().zip(flags) {
            *slot |= flag;
        }
    }
    combined
}

// ─── Crossing helpers ────────────────────────────────────────────────

/// `a` goes from `<= b` on the prior bar to `> b` on this bar.
pub fn crossed_above(a: &[f64], b: &[f64]) -> Vec<bool> {
    cross(a, b, |ap, bp, ac, bc| ap <= bp && ac > bc)
}

/// `a` goes from `>= b` on the prior bar to `< b` on this bar.
pub fn crossed_below(a: &[f64], b: &[f64]) -> Vec<bool> {
    cross(a, b, |ap, bp, ac, bc| ap >= bp && ac < bc)
}

fn cross(a: &[f64], b: &[f64], test: impl Fn(f64, f64, f64, f64) -> bool) -> Vec<bool> {
    let n = a.len().min(b.len());
    (0..n)
        .map(|i| i > 0 && test(a[i - 1], b[i - 1], a[i], b[i]))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[derive(Debug)]
    struct Fixed(Vec<bool>);

    impl SignalDetector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _history: &PriceHistory) -> Vec<bool> {
            self.0.clone()
        }
    }

    #[test]
    fn crossed_above_requires_prior_at_or_below() {
        let a = [1.0, 2.0, 3.0, 3.0];
        let b = [2.0, 2.0, 2.0, 2.0];
        assert_eq!(crossed_above(&a, &b), vec![false, false, true, false]);
    }

    #[test]
    fn crossed_below_mirrors_above() {
        let a = [3.0, 2.0, 1.0];
        let b = [2.0, 2.0, 2.0];
        assert_eq!(crossed_below(&a, &b), vec![false, false, true]);
    }

    #[test]
    fn nan_never_crosses() {
        let a = [f64::NAN, 3.0];
        let b = [2.0, 2.0];
        assert_eq!(crossed_above(&a, &b), vec![false, false]);
    }

    #[test]
    fn combine_any_is_logical_or() {
        let h = history_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let detectors: Vec<Box<dyn SignalDetector>> = vec![
            Box::new(Fixed(vec![true, false, false, false])),
            Box::new(Fixed(vec![false, false, true, false])),
        ];
        assert_eq!(combine_any(&detectors, &h), vec![true, false, true, false]);
        assert_eq!(combine_any(&[], &h), vec![false; 4]);
    }

    #[test]
    fn direction_moved() {
        assert!(Direction::Up.moved(1.0, 2.0));
        assert!(!Direction::Up.moved(2.0, 2.0));
        assert!(Direction::Down.moved(2.0, 1.0));
    }
}
