//! Bar and PriceHistory — the market data units consumed by detectors and the simulator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar for a single symbol.
///
/// Volume is optional: some sources (index levels, FX fixings) carry no volume
/// column at all, and the volume detectors treat that as "no signal".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl Bar {
    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }
}

/// Ordered bar series for one symbol. Dates are unique and ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Volume column as floats, or `None` when any bar lacks volume.
    pub fn volumes(&self) -> Option<Vec<f64>> {
        self.bars.iter().map(|b| b.volume.map(|v| v as f64)).collect()
    }

    /// Drop void bars, returning a cleaned copy.
    ///
    /// When the series carries volume at all, a bar missing its volume is
    /// void too, so one blank cell cannot blank out the volume column.
    pub fn without_void_bars(&self) -> Self {
        let has_volume = self.bars.iter().any(|b| b.volume.is_some());
        Self {
            symbol: self.symbol.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| !b.is_void() && (!has_volume || b.volume.is_some()))
                .cloned()
                .collect(),
        }
    }

    /// Restrict to bars whose date falls in `[start, end]`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: self.symbol.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect(),
        }
    }
}
