//! SignalLab Runner — multi-symbol backtests, results, parameter search.
//!
//! This crate builds on `signallab-core` to provide:
//! - A bounded worker pool with completion-order collection
//! - The multi-symbol backtester with screener support
//! - Results aggregation (summary metrics, breakdowns, combined equity)
//!   and CSV / workbook / HTML / Markdown export
//! - Grid and random parameter search with constraints, timeouts,
//!   walk-forward validation and NDJSON streaming
//! - The optimization results store (ranking, top-n, heatmaps, JSON)
//! - TOML run configuration

pub mod backtester;
pub mod config;
pub mod export;
pub mod history;
pub mod metrics;
pub mod optimizer;
pub mod pool;
pub mod results;
pub mod search;
pub mod store;
pub mod walk_forward;

pub use backtester::{BacktestError, Backtester, MIN_BARS};
pub use config::{RunConfig, RunConfigError};
pub use export::ExportFormat;
pub use history::{read_trials, TrialStream};
pub use metrics::Summary;
pub use optimizer::{OptimizeError, OptimizeRequest, Optimizer};
pub use pool::{run_tasks, Completion, PoolError};
pub use results::{combine_equity, BacktestResults, BreakdownRow};
pub use search::{ParamValue, Params, SearchError, SearchMethod, SearchSpace};
pub use store::{
    Heatmap, Metrics, MetricSpec, OptimizationResults, RankedRow, StoreError, TrialResult,
};
pub use walk_forward::{Fold, WalkForwardConfig, WalkForwardError};
