//! Universe configuration — sector-organized ticker lists.
//!
//! The universe is a TOML file mapping sector names to member tickers. It
//! serves two roles: it is the built-in [`SymbolSelector`] (screener) and
//! the source of the symbol → sector map used for sector breakdowns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::provider::DataError;

/// Filter handed to a [`SymbolSelector`].
///
/// `sectors` restricts the selection (empty means every sector), `symbols`
/// is an explicit allow-list, `limit` caps the number of returned symbols.
/// `criteria` carries selector-specific numeric thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenerFilter {
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

/// External screening collaborator: returns candidate symbols for a filter.
pub trait SymbolSelector: Send + Sync {
    fn select(&self, filter: &ScreenerFilter) -> Result<Vec<String>, DataError>;
}

/// The complete universe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Universe(format!("parse universe TOML: {e}")))
    }

    /// Serialize the universe to TOML.
    pub fn to_toml(&self) -> Result<String, DataError> {
        toml::to_string_pretty(self)
            .map_err(|e| DataError::Universe(format!("serialize universe: {e}")))
    }

    /// All tickers across all sectors, in sector order.
    pub fn all_tickers(&self) -> Vec<&str> {
        self.sectors
            .values()
            .flat_map(|tickers| tickers.iter().map(|t| t.as_str()))
            .collect()
    }

    pub fn sector_tickers(&self, sector: &str) -> Option<&[String]> {
        self.sectors.get(sector).map(|v| v.as_slice())
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sectors.keys().map(|s| s.as_str()).collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.sectors.values().map(|v| v.len()).sum()
    }

    /// Symbol → sector lookup. A ticker listed under several sectors maps to
    /// the first one in sector order.
    pub fn sector_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (sector, tickers) in &self.sectors {
            for ticker in tickers {
                map.entry(ticker.clone()).or_insert_with(|| sector.clone());
            }
        }
        map
    }
}

impl SymbolSelector for Universe {
    fn select(&self, filter: &ScreenerFilter) -> Result<Vec<String>, DataError> {
        for sector in &filter.sectors {
            if !self.sectors.contains_key(sector) {
                return Err(DataError::Universe(format!("unknown sector '{sector}'")));
            }
        }

        let mut selected: Vec<String> = Vec::new();
        for (sector, tickers) in &self.sectors {
            if !filter.sectors.is_empty() && !filter.sectors.contains(sector) {
                continue;
            }
            for ticker in tickers {
                if !filter.symbols.is_empty() && !filter.symbols.contains(ticker) {
                    continue;
                }
                if !selected.contains(ticker) {
                    selected.push(ticker.clone());
                }
            }
        }

        if let Some(limit) = filter.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[sectors]
Technology = ["AAPL", "MSFT", "NVDA"]
Energy = ["XOM", "CVX"]
ETFs = ["SPY", "XLK"]
"#;

    fn sample() -> Universe {
        Universe::from_toml(SAMPLE).unwrap()
    }

    #[test]
    fn parses_sectors() {
        let u = sample();
        assert_eq!(u.sector_names(), vec!["ETFs", "Energy", "Technology"]);
        assert_eq!(u.ticker_count(), 7);
        assert!(u.sector_tickers("Energy").unwrap().contains(&"XOM".to_string()));
    }

    #[test]
    fn toml_roundtrip() {
        let u = sample();
        let parsed = Universe::from_toml(&u.to_toml().unwrap()).unwrap();
        assert_eq!(u.ticker_count(), parsed.ticker_count());
    }

    #[test]
    fn sector_map_inverts_lists() {
        let map = sample().sector_map();
        assert_eq!(map.get("CVX").map(String::as_str), Some("Energy"));
        assert_eq!(map.get("SPY").map(String::as_str), Some("ETFs"));
    }

    #[test]
    fn select_by_sector_with_limit() {
        let u = sample();
        let filter = ScreenerFilter {
            sectors: vec!["Technology".into()],
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(u.select(&filter).unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn select_everything_by_default() {
        assert_eq!(sample().select(&ScreenerFilter::default()).unwrap().len(), 7);
    }

    #[test]
    fn unknown_sector_is_an_error() {
        let filter = ScreenerFilter {
            sectors: vec!["Utilities".into()],
            ..Default::default()
        };
        assert!(sample().select(&filter).is_err());
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(Universe::from_toml("sectors = 3").is_err());
    }
}
