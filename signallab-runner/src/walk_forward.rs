//! Walk-forward validation — calendar fold splitting and out-of-sample
//! evaluation.
//!
//! The date range is cut into `n_splits` equal calendar segments. Within
//! each segment the first `train_ratio` share of days is the training
//! window; the remainder (from the day after training ends to the segment
//! end) is the test window. A strategy is re-run on every test window and the
//! out-of-sample metrics are averaged without weighting.

use std::fmt::Display;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::metrics::Summary;
use crate::store::Metrics;

/// Metrics reported out of sample.
pub const OOS_METRICS: [&str; 3] = ["total_return", "sharpe_ratio", "win_rate"];

// ─── Configuration ───────────────────────────────────────────────────

/// Configuration for walk-forward validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Share of each segment used for training (default 0.7).
    pub train_ratio: f64,
    /// Number of calendar segments (default 5).
    pub n_splits: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            n_splits: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalkForwardError {
    #[error("n_splits must be at least 1")]
    NoSplits,
    #[error("train_ratio must be in [0, 1), got {0}")]
    BadTrainRatio(f64),
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.n_splits == 0 {
            return Err(WalkForwardError::NoSplits);
        }
        if !(0.0..1.0).contains(&self.train_ratio) {
            return Err(WalkForwardError::BadTrainRatio(self.train_ratio));
        }
        Ok(())
    }
}

// ─── Fold creation ───────────────────────────────────────────────────

/// One train/test split. All bounds are inclusive calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// Folds over `[start, end]`. Segments whose test window is empty are
/// omitted.
pub fn create_folds(start: NaiveDate, end: NaiveDate, config: &WalkForwardConfig) -> Vec<Fold> {
    if config.n_splits == 0 {
        return Vec::new();
    }
    let total_days = (end - start).num_days().max(0);
    let split_days = total_days / config.n_splits as i64;
    let train_days = (split_days as f64 * config.train_ratio).floor() as i64;

    (0..config.n_splits)
        .filter_map(|i| {
            let segment_start = start + Duration::days(i as i64 * split_days);
            let segment_end = segment_start + Duration::days(split_days);
            let train_end = segment_start + Duration::days(train_days);
            let test_start = train_end + Duration::days(1);
            (test_start < segment_end).then_some(Fold {
                index: i,
                train_start: segment_start,
                train_end,
                test_start,
                test_end: segment_end,
            })
        })
        .collect()
}

// ─── Evaluation ──────────────────────────────────────────────────────

/// Average out-of-sample metrics over `folds`.
///
/// `evaluate` runs the strategy on one test window. Failing folds are
/// logged and skipped; with no successful fold every metric is zero.
pub fn out_of_sample<F, E>(folds: &[Fold], mut evaluate: F) -> Metrics
where
    F: FnMut(NaiveDate, NaiveDate) -> Result<Summary, E>,
    E: Display,
{
    let mut sums = [0.0; OOS_METRICS.len()];
    let mut successes = 0usize;

    for fold in folds {
        match evaluate(fold.test_start, fold.test_end) {
            Ok(summary) => {
                for (sum, name) in sums.iter_mut().zip(OOS_METRICS) {
                    *sum += summary.search_metric(name).unwrap_or(0.0);
                }
                successes += 1;
            }
            Err(err) => {
                debug!(fold = fold.index, error = %err, "walk-forward fold failed");
            }
        }
    }

    OOS_METRICS
        .iter()
        .zip(sums)
        .map(|(name, sum)| {
            let mean = if successes == 0 {
                0.0
            } else {
                sum / successes as f64
            };
            (name.to_string(), mean)
        })
        .collect()
}
