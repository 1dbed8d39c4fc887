//! Price provider trait and structured error types.
//!
//! The `PriceProvider` trait abstracts over price sources (CSV directory,
//! synthetic generator, in-memory fixtures) so the backtester can be driven
//! by any of them and mocked in tests.

use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::PriceHistory;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed price data for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("universe config error: {0}")]
    Universe(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Source of daily price histories.
///
/// Implementations return bars ordered by date with unique dates, restricted
/// to `[start, end]`. A symbol the source has never heard of is reported as
/// [`DataError::SymbolNotFound`].
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn get_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, DataError>;
}

/// Provider backed by pre-loaded histories. Used by tests and embedders
/// that already hold data in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    histories: HashMap<String, PriceHistory>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, history: PriceHistory) {
        self.histories.insert(history.symbol.clone(), history);
    }

    pub fn with_history(mut self, history: PriceHistory) -> Self {
        self.insert(history);
        self
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.histories.keys().map(|s| s.as_str()).collect();
        symbols.sort_unstable();
        symbols
    }
}

impl PriceProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, DataError> {
        self.histories
            .get(symbol)
            .map(|h| h.slice_dates(start, end))
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}
