//! Synthetic price provider.
//!
//! Produces a deterministic random walk per symbol: the RNG seed is the
//! BLAKE3 hash of the symbol name, so the same symbol always yields the same
//! series regardless of call order or thread. Weekends are skipped.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, PriceProvider};
use crate::domain::{Bar, PriceHistory};

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    start_price: f64,
    daily_range: f64,
    with_volume: bool,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            start_price: 100.0,
            daily_range: 0.03,
            with_volume: true,
        }
    }
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Omit the volume column from generated bars.
    pub fn without_volume(mut self) -> Self {
        self.with_volume = false;
        self
    }

    pub fn with_daily_range(mut self, daily_range: f64) -> Self {
        self.daily_range = daily_range.abs();
        self
    }

    fn rng_for(symbol: &str) -> StdRng {
        let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
        StdRng::from_seed(seed)
    }

    /// Generate bars over `[start, end]`.
    pub fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
        let mut rng = Self::rng_for(symbol);
        let mut bars = Vec::new();
        let mut price = self.start_price;
        let mut current = start;

        while current <= end {
            if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                current += Duration::days(1);
                continue;
            }

            let daily_return: f64 = if self.daily_range > 0.0 {
                rng.gen_range(-self.daily_range..self.daily_range)
            } else {
                0.0
            };
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64);

            bars.push(Bar {
                date: current,
                open,
                high,
                low,
                close,
                volume: self.with_volume.then_some(volume),
            });

            price = close;
            current += Duration::days(1);
        }

        bars
    }
}

impl PriceProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn get_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, DataError> {
        if symbol.trim().is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(PriceHistory::new(symbol, self.generate(symbol, start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    #[test]
    fn same_symbol_same_series() {
        let (start, end) = range();
        let p = SyntheticProvider::new();
        let a = p.get_prices("SPY", start, end).unwrap();
        let b = p.get_prices("SPY", start, end).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_symbols_differ() {
        let (start, end) = range();
        let p = SyntheticProvider::new();
        let a = p.get_prices("SPY", start, end).unwrap();
        let b = p.get_prices("QQQ", start, end).unwrap();
        assert_ne!(a.closes(), b.closes());
    }

    #[test]
    fn skips_weekends_and_keeps_ohlc_consistent() {
        let (start, end) = range();
        let h = SyntheticProvider::new().get_prices("SPY", start, end).unwrap();
        assert!(!h.is_empty());
        for bar in &h.bars {
            assert!(!matches!(bar.date.weekday(), Weekday::Sat | Weekday::Sun));
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low <= bar.open.min(bar.close));
        }
    }

    #[test]
    fn without_volume_drops_column() {
        let (start, end) = range();
        let h = SyntheticProvider::new()
            .without_volume()
            .get_prices("SPY", start, end)
            .unwrap();
        assert!(h.volumes().is_none());
    }
}
