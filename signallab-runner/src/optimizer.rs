//! Parameter search engine — evaluates every trial of a search space with
//! a fresh backtester and collects the outcomes.
//!
//! Trials run on a bounded pool; results are collected in completion order
//! on the calling thread, which also owns the wall-clock timeout check and
//! the optional NDJSON stream. Inner backtests run single-threaded so the
//! pool size is the only source of parallelism.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use signallab_core::data::PriceProvider;
use signallab_core::engine::DEFAULT_CASH;
use signallab_core::ConfigError;

use crate::backtester::{BacktestError, Backtester};
use crate::history::TrialStream;
use crate::pool::{available_parallelism, run_tasks, PoolError};
use crate::search::{ParamValue, Params, SearchError, SearchMethod, SearchSpace, DEFAULT_N_TRIALS};
use crate::store::{Metrics, MetricSpec, OptimizationResults, TrialResult};
use crate::walk_forward::{create_folds, out_of_sample, Fold, WalkForwardConfig, WalkForwardError};

/// Metrics recorded for every trial, read through [`Summary::search_metric`].
///
/// [`Summary::search_metric`]: crate::metrics::Summary::search_metric
pub const TRIAL_METRICS: [&str; 5] = [
    "total_return",
    "sharpe_ratio",
    "max_drawdown",
    "win_rate",
    "profit_factor",
];

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    WalkForward(#[from] WalkForwardError),

    #[error("optimization timed out after {timeout:?}: {completed}/{total} trials completed")]
    Timeout {
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    #[error("streaming output {path}: {source}")]
    Stream {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

// ─── Request ─────────────────────────────────────────────────────────

/// Everything a single optimization run needs besides the search space.
#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub method: SearchMethod,
    /// Sample size for random search.
    pub n_trials: usize,
    pub seed: Option<u64>,
    pub metric: MetricSpec,
    /// Concurrent trials; defaults to the available parallelism.
    pub n_jobs: Option<usize>,
    pub timeout: Option<Duration>,
    pub walk_forward: Option<WalkForwardConfig>,
    pub streaming_output: Option<PathBuf>,
}

impl OptimizeRequest {
    pub fn new(symbols: Vec<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbols,
            start,
            end,
            method: SearchMethod::Grid,
            n_trials: DEFAULT_N_TRIALS,
            seed: None,
            metric: MetricSpec::default(),
            n_jobs: None,
            timeout: None,
            walk_forward: None,
            streaming_output: None,
        }
    }

    pub fn random(mut self, n_trials: usize, seed: Option<u64>) -> Self {
        self.method = SearchMethod::Random;
        self.n_trials = n_trials;
        self.seed = seed;
        self
    }

    pub fn with_metric(mut self, metric: MetricSpec) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_walk_forward(mut self, config: WalkForwardConfig) -> Self {
        self.walk_forward = Some(config);
        self
    }

    pub fn with_streaming_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.streaming_output = Some(path.into());
        self
    }
}

// ─── Optimizer ───────────────────────────────────────────────────────

/// Grid / random search over strategy parameters.
pub struct Optimizer {
    provider: Arc<dyn PriceProvider>,
    cash: f64,
    commission: f64,
    space: SearchSpace,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("provider", &self.provider.name())
            .field("cash", &self.cash)
            .field("commission", &self.commission)
            .field("space", &self.space)
            .finish()
    }
}

impl Optimizer {
    pub fn new(provider: Arc<dyn PriceProvider>) -> Self {
        Self {
            provider,
            cash: DEFAULT_CASH,
            commission: 0.0,
            space: SearchSpace::new(),
        }
    }

    pub fn with_cash(mut self, cash: f64) -> Self {
        self.cash = cash;
        self
    }

    pub fn with_commission(mut self, commission: f64) -> Self {
        self.commission = commission;
        self
    }

    pub fn search_space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn add_search_space(
        &mut self,
        name: &str,
        values: Vec<ParamValue>,
    ) -> Result<&mut Self, SearchError> {
        self.space.add(name, values)?;
        Ok(self)
    }

    pub fn add_constraint<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&Params) -> bool + Send + Sync + 'static,
    {
        self.space.add_constraint(predicate);
        self
    }

    /// Build the backtester a parameter assignment describes.
    ///
    /// Recognized names: `ma_short` + `ma_long` (golden cross),
    /// `rsi_threshold` [+ `rsi_period`] (RSI oversold), `macd_fast` +
    /// `macd_slow` [+ `macd_signal`] (MACD cross), and the exit rules
    /// `stop_loss`, `take_profit`, `trailing_stop`, `max_holding_days`.
    pub fn trial_backtester(&self, params: &Params) -> Result<Backtester, ConfigError> {
        let get = |name: &str| params.get(name).map(ParamValue::as_f64);
        let mut bt = Backtester::new(Arc::clone(&self.provider))
            .with_cash(self.cash)
            .with_commission(self.commission);

        if let (Some(short), Some(long)) = (get("ma_short"), get("ma_long")) {
            bt.add_signal("golden_cross", named(&[("short", short), ("long", long)]))?;
        }
        if let Some(threshold) = get("rsi_threshold") {
            let period = get("rsi_period").unwrap_or(14.0);
            bt.add_signal(
                "rsi_oversold",
                named(&[("period", period), ("threshold", threshold)]),
            )?;
        }
        if let (Some(fast), Some(slow)) = (get("macd_fast"), get("macd_slow")) {
            let signal_period = get("macd_signal").unwrap_or(9.0);
            bt.add_signal(
                "macd_cross",
                named(&[("fast", fast), ("slow", slow), ("signal_period", signal_period)]),
            )?;
        }
        for (rule, key) in [
            ("stop_loss", "threshold"),
            ("take_profit", "threshold"),
            ("trailing_stop", "threshold"),
            ("max_holding_days", "days"),
        ] {
            if let Some(value) = get(rule) {
                bt.add_exit_rule(rule, &named(&[(key, value)]))?;
            }
        }
        Ok(bt)
    }

    /// Run one trial: full-period metrics, plus out-of-sample metrics over
    /// `folds` when walk-forward validation is on.
    pub fn evaluate(
        &self,
        params: &Params,
        request: &OptimizeRequest,
        folds: Option<&[Fold]>,
    ) -> Result<TrialResult, BacktestError> {
        let bt = self.trial_backtester(params)?;
        let results = bt.run(&request.symbols, request.start, request.end, Some(1))?;
        let summary = results.summary();
        let metrics: Metrics = TRIAL_METRICS
            .iter()
            .map(|&name| (name.to_string(), summary.search_metric(name).unwrap_or(0.0)))
            .collect();

        let oos_metrics = folds.map(|folds| {
            out_of_sample(folds, |start, end| {
                bt.run(&request.symbols, start, end, Some(1))
                    .map(|r| *r.summary())
            })
        });

        Ok(TrialResult {
            params: params.clone(),
            metrics,
            oos_metrics,
        })
    }

    /// Evaluate every generated trial.
    ///
    /// Fails before any evaluation when the space is empty or nothing
    /// survives the constraints. Trials that fail are logged and left out.
    /// Exceeding the timeout cancels outstanding trials and discards all
    /// results.
    pub fn run(&self, request: &OptimizeRequest) -> Result<OptimizationResults, OptimizeError> {
        if let Some(wf) = &request.walk_forward {
            wf.validate()?;
        }
        let trials = self
            .space
            .generate(request.method, request.n_trials, request.seed)?;
        let total = trials.len();
        let folds: Option<Vec<Fold>> = request
            .walk_forward
            .as_ref()
            .map(|wf| create_folds(request.start, request.end, wf));

        let stream = match &request.streaming_output {
            Some(path) => Some(TrialStream::create(path).map_err(|source| {
                OptimizeError::Stream {
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let workers = request.n_jobs.unwrap_or_else(available_parallelism).max(1);
        info!(
            trials = total,
            workers,
            method = ?request.method,
            metric = %request.metric,
            walk_forward = folds.is_some(),
            "starting optimization"
        );

        let started = Instant::now();
        let mut collected: Vec<Option<TrialResult>> = vec![None; total];
        let mut completed = 0usize;
        let mut failure: Option<OptimizeError> = None;

        run_tasks(
            workers,
            trials,
            |params| {
                let outcome = self.evaluate(&params, request, folds.as_deref());
                (params, outcome)
            },
            |index, (params, outcome)| {
                if let Some(timeout) = request.timeout {
                    if started.elapsed() >= timeout {
                        failure = Some(OptimizeError::Timeout {
                            timeout,
                            completed,
                            total,
                        });
                        return ControlFlow::Break(());
                    }
                }
                match outcome {
                    Ok(trial) => {
                        if let Some(stream) = &stream {
                            if let Err(source) = stream.append(&trial) {
                                failure = Some(OptimizeError::Stream {
                                    path: stream.path().to_path_buf(),
                                    source,
                                });
                                return ControlFlow::Break(());
                            }
                        }
                        debug!(?params, "trial complete");
                        collected[index] = Some(trial);
                        completed += 1;
                    }
                    Err(err) => warn!(?params, error = %err, "trial failed"),
                }
                ControlFlow::Continue(())
            },
        )?;
        drop(stream);

        if let Some(err) = failure {
            warn!(error = %err, "optimization aborted");
            return Err(err);
        }

        let trials: Vec<TrialResult> = collected.into_iter().flatten().collect();
        info!(
            completed = trials.len(),
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "optimization complete"
        );
        Ok(OptimizationResults::new(
            trials,
            request.metric.clone(),
            self.space.to_map(),
        ))
    }
}

fn named(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use signallab_core::data::SyntheticProvider;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ints(values: &[i64]) -> Vec<ParamValue> {
        values.iter().map(|&v| ParamValue::Int(v)).collect()
    }

    fn optimizer() -> Optimizer {
        Optimizer::new(Arc::new(SyntheticProvider::new()))
    }

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn convention_maps_params_to_components() {
        let opt = optimizer();
        let bt = opt
            .trial_backtester(&params(&[
                ("ma_short", ParamValue::Int(5)),
                ("ma_long", ParamValue::Int(20)),
                ("rsi_threshold", ParamValue::Int(25)),
                ("macd_fast", ParamValue::Int(8)),
                ("macd_slow", ParamValue::Int(21)),
                ("stop_loss", ParamValue::Float(-0.05)),
                ("max_holding_days", ParamValue::Int(10)),
            ]))
            .unwrap();
        let names: Vec<&str> = bt.signals().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["golden_cross", "rsi_oversold", "macd_cross"]);
        assert_eq!(bt.signals()[1].params["period"], 14.0);
        assert_eq!(bt.signals()[2].params["signal_period"], 9.0);
        let exits = bt.simulation_config().exit_rules;
        assert_eq!(exits.stop_loss, Some(-0.05));
        assert_eq!(exits.max_holding_days, Some(10));
        assert_eq!(exits.take_profit, None);
    }

    #[test]
    fn lone_ma_short_adds_no_signal() {
        let bt = optimizer()
            .trial_backtester(&params(&[("ma_short", ParamValue::Int(5))]))
            .unwrap();
        assert!(bt.signals().is_empty());
    }

    #[test]
    fn invalid_exit_param_is_config_error() {
        let err = optimizer()
            .trial_backtester(&params(&[("stop_loss", ParamValue::Float(0.1))]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { .. }));
    }

    #[test]
    fn empty_space_fails_before_evaluation() {
        let request = OptimizeRequest::new(vec!["AAA".into()], d(2023, 1, 1), d(2023, 12, 31));
        let err = optimizer().run(&request).unwrap_err();
        assert!(matches!(err, OptimizeError::Search(SearchError::EmptySpace)));
    }

    #[test]
    fn bad_walk_forward_config_rejected() {
        let mut opt = optimizer();
        opt.add_search_space("ma_short", ints(&[5])).unwrap();
        let request = OptimizeRequest::new(vec!["AAA".into()], d(2023, 1, 1), d(2023, 12, 31))
            .with_walk_forward(WalkForwardConfig {
                train_ratio: 0.7,
                n_splits: 0,
            });
        assert!(matches!(
            opt.run(&request),
            Err(OptimizeError::WalkForward(WalkForwardError::NoSplits))
        ));
    }

    #[test]
    fn failing_trials_are_omitted() {
        let mut opt = optimizer();
        // No ma_long → no signal → every trial fails with NoSignals.
        opt.add_search_space("ma_short", ints(&[5, 10])).unwrap();
        let request = OptimizeRequest::new(vec!["AAA".into()], d(2023, 1, 1), d(2023, 12, 31))
            .with_jobs(1);
        let results = opt.run(&request).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn grid_trials_carry_all_metrics() {
        let mut opt = optimizer();
        opt.add_search_space("ma_short", ints(&[5, 10]))
            .unwrap()
            .add_search_space("ma_long", ints(&[20, 40]))
            .unwrap();
        let request = OptimizeRequest::new(vec!["AAA".into()], d(2023, 1, 1), d(2023, 12, 31))
            .with_jobs(2);
        let results = opt.run(&request).unwrap();
        assert_eq!(results.len(), 4);
        for trial in results.trials() {
            for name in TRIAL_METRICS {
                assert!(trial.metrics.contains_key(name), "missing {name}");
            }
            assert!(trial.oos_metrics.is_none());
        }
        assert_eq!(results.search_spaces()["ma_long"], ints(&[20, 40]));
    }
}
