//! Backtester — configures detectors and drives the simulator per symbol.
//!
//! Configuration calls validate eagerly and fail with a [`ConfigError`].
//! A run fetches each symbol independently (sequentially or on a bounded
//! pool), simulates it, and folds the per-symbol outcomes into a
//! [`BacktestResults`]. Outcomes are reassembled in symbol order, so serial
//! and parallel runs produce identical results.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use signallab_core::components::{
    builtin_registry, combine_any, EntryRule, ExitRule, SignalConfig, SignalDetector,
};
use signallab_core::data::{DataError, PriceProvider, ScreenerFilter, SymbolSelector};
use signallab_core::engine::{simulate, SimulationConfig, SimulationOutcome};
use signallab_core::ConfigError;

use crate::pool::{run_tasks, PoolError};
use crate::results::{combine_equity, BacktestResults};

/// Minimum usable bars per symbol.
pub const MIN_BARS: usize = 30;

/// Default upper bound on concurrent symbol tasks.
pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("insufficient data for {symbol}: {bars} bars (need at least {required})")]
    InsufficientData {
        symbol: String,
        bars: usize,
        required: usize,
    },

    /// Fatal data failure (unknown symbol).
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("screener failed: {0}")]
    Screener(#[source] DataError),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Per-symbol failure before classification.
#[derive(Debug)]
enum SymbolFailure {
    Fatal(BacktestError),
    Skip(DataError),
}

/// Signal-driven backtester over a price provider.
pub struct Backtester {
    provider: Arc<dyn PriceProvider>,
    config: SimulationConfig,
    signals: Vec<SignalConfig>,
    detectors: Vec<Box<dyn SignalDetector>>,
}

impl std::fmt::Debug for Backtester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtester")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("signals", &self.signals)
            .finish()
    }
}

impl Backtester {
    pub fn new(provider: Arc<dyn PriceProvider>) -> Self {
        Self {
            provider,
            config: SimulationConfig::default(),
            signals: Vec::new(),
            detectors: Vec::new(),
        }
    }

    pub fn with_cash(mut self, cash: f64) -> Self {
        self.config.cash = cash;
        self
    }

    pub fn with_commission(mut self, commission: f64) -> Self {
        self.config.commission = commission;
        self
    }

    pub fn simulation_config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn signals(&self) -> &[SignalConfig] {
        &self.signals
    }

    /// Attach a detector by registry name. Several detectors combine with OR.
    pub fn add_signal(
        &mut self,
        name: &str,
        params: BTreeMap<String, f64>,
    ) -> Result<&mut Self, ConfigError> {
        let config = SignalConfig {
            name: name.to_string(),
            params,
        };
        let detector = builtin_registry().create(&config)?;
        self.signals.push(config);
        self.detectors.push(detector);
        Ok(self)
    }

    pub fn add_entry_rule(
        &mut self,
        name: &str,
        params: &BTreeMap<String, f64>,
    ) -> Result<&mut Self, ConfigError> {
        self.config.entry_rule = EntryRule::from_config(name, params)?;
        Ok(self)
    }

    /// Add an exit rule; a rule of the same kind is replaced.
    pub fn add_exit_rule(
        &mut self,
        name: &str,
        params: &BTreeMap<String, f64>,
    ) -> Result<&mut Self, ConfigError> {
        let rule = ExitRule::from_config(name, params)?;
        self.config.exit_rules.set(rule);
        Ok(self)
    }

    /// Backtest every symbol over `[start, end]`.
    ///
    /// `max_workers` defaults to `min(symbols, 4)`; one worker or one symbol
    /// runs sequentially.
    pub fn run(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        max_workers: Option<usize>,
    ) -> Result<BacktestResults, BacktestError> {
        if self.detectors.is_empty() {
            return Err(ConfigError::NoSignals.into());
        }
        if start > end {
            return Err(BacktestError::InvalidRange { start, end });
        }
        if symbols.is_empty() {
            warn!("no symbols to backtest");
            return Ok(BacktestResults::empty());
        }

        let workers = max_workers.unwrap_or_else(|| symbols.len().min(DEFAULT_MAX_WORKERS));
        info!(
            symbols = symbols.len(),
            workers,
            %start,
            %end,
            provider = self.provider.name(),
            "starting backtest"
        );

        let mut outcomes: Vec<Option<SimulationOutcome>> = vec![None; symbols.len()];
        let mut fatal: Option<BacktestError> = None;

        run_tasks(
            workers,
            symbols.iter().collect(),
            |symbol| self.run_symbol(symbol, start, end),
            |index, result| match result {
                Ok(outcome) => {
                    outcomes[index] = Some(outcome);
                    ControlFlow::Continue(())
                }
                Err(SymbolFailure::Skip(err)) => {
                    warn!(symbol = %symbols[index], error = %err, "skipping symbol");
                    ControlFlow::Continue(())
                }
                Err(SymbolFailure::Fatal(err)) => {
                    fatal = Some(err);
                    ControlFlow::Break(())
                }
            },
        )?;

        if let Some(err) = fatal {
            return Err(err);
        }

        let mut trades = Vec::new();
        let mut curves = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            trades.extend(outcome.trades);
            curves.push(outcome.equity);
        }
        info!(
            trades = trades.len(),
            symbols_ok = curves.len(),
            "backtest complete"
        );
        Ok(BacktestResults::new(trades, combine_equity(&curves)))
    }

    /// Backtest the symbols chosen by `selector` for `filter`.
    ///
    /// An empty selection is not an error: it yields empty results.
    pub fn run_with_screener(
        &self,
        selector: &dyn SymbolSelector,
        filter: &ScreenerFilter,
        start: NaiveDate,
        end: NaiveDate,
        max_workers: Option<usize>,
    ) -> Result<BacktestResults, BacktestError> {
        if self.detectors.is_empty() {
            return Err(ConfigError::NoSignals.into());
        }
        let symbols = selector.select(filter).map_err(BacktestError::Screener)?;
        if symbols.is_empty() {
            warn!(?filter, "screener selected no symbols");
            return Ok(BacktestResults::empty());
        }
        info!(selected = symbols.len(), "screener selection");
        self.run(&symbols, start, end, max_workers)
    }

    fn run_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SimulationOutcome, SymbolFailure> {
        let history = match self.provider.get_prices(symbol, start, end) {
            Ok(history) => history.without_void_bars(),
            Err(err @ DataError::SymbolNotFound { .. }) => {
                return Err(SymbolFailure::Fatal(err.into()))
            }
            Err(err) => return Err(SymbolFailure::Skip(err)),
        };
        if history.len() < MIN_BARS {
            return Err(SymbolFailure::Fatal(BacktestError::InsufficientData {
                symbol: symbol.to_string(),
                bars: history.len(),
                required: MIN_BARS,
            }));
        }

        let signal = combine_any(&self.detectors, &history);
        let outcome = simulate(&history, &signal, &self.config);
        debug!(
            symbol,
            bars = history.len(),
            trades = outcome.trades.len(),
            "symbol simulated"
        );
        Ok(outcome)
    }
}
