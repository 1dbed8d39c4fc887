//! CSV directory provider.
//!
//! Reads `<dir>/<SYMBOL>.csv` with a header row of
//! `date,open,high,low,close[,volume]`. Dates are `%Y-%m-%d`. Rows are
//! sorted by date and duplicate dates keep the last occurrence.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use super::provider::{DataError, PriceProvider};
use crate::domain::{Bar, PriceHistory};

pub struct CsvPriceProvider {
    base_dir: PathBuf,
}

impl CsvPriceProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_dir.join(format!("{symbol}.csv"))
    }
}

impl PriceProvider for CsvPriceProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn get_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, DataError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        let bars = read_bars(&path, symbol)?;
        debug!(symbol, bars = bars.len(), path = %path.display(), "loaded CSV prices");
        Ok(PriceHistory::new(symbol, bars).slice_dates(start, end))
    }
}

fn read_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>, DataError> {
    let malformed = |reason: String| DataError::Malformed {
        symbol: symbol.to_string(),
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(source) => DataError::Io {
                path: path.display().to_string(),
                source,
            },
            other => malformed(format!("{other:?}")),
        })?;

    let headers = rdr
        .headers()
        .map_err(|e| malformed(format!("header: {e}")))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| malformed(format!("missing {name} column")))
    };
    let date_col = column("date")?;
    let open_col = column("open")?;
    let high_col = column("high")?;
    let low_col = column("low")?;
    let close_col = column("close")?;
    let volume_col = headers.iter().position(|h| h.eq_ignore_ascii_case("volume"));

    let mut bars = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| malformed(format!("row {}: {e}", line + 1)))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let number = |idx: usize, name: &str| -> Result<f64, DataError> {
            let raw = field(idx);
            if raw.is_empty() {
                return Ok(f64::NAN);
            }
            raw.parse::<f64>()
                .map_err(|e| malformed(format!("row {}: invalid {name} '{raw}': {e}", line + 1)))
        };

        let date = NaiveDate::parse_from_str(field(date_col), "%Y-%m-%d")
            .map_err(|e| malformed(format!("row {}: invalid date: {e}", line + 1)))?;
        let volume = match volume_col {
            Some(idx) if !field(idx).is_empty() => {
                let v = number(idx, "volume")?;
                Some(v.max(0.0) as u64)
            }
            _ => None,
        };

        bars.push(Bar {
            date,
            open: number(open_col, "open")?,
            high: number(high_col, "high")?,
            low: number(low_col, "low")?,
            close: number(close_col, "close")?,
            volume,
        });
    }

    bars.sort_by_key(|b| b.date);
    // keep the last row for a repeated date
    let rows = bars.len();
    bars.reverse();
    bars.dedup_by_key(|b| b.date);
    bars.reverse();
    if bars.len() < rows {
        debug!(symbol, duplicates = rows - bars.len(), "dropped duplicate dates");
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn reads_sorted_bars_with_volume() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("AAA.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-03,11,12,10,11.5,2000\n\
             2024-01-02,10,11,9,10.5,1000\n",
        )
        .unwrap();

        let provider = CsvPriceProvider::new(dir.path());
        let h = provider
            .get_prices("AAA", d(2024, 1, 1), d(2024, 1, 31))
            .unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.bars[0].date, d(2024, 1, 2));
        assert_eq!(h.volumes(), Some(vec![1000.0, 2000.0]));
    }

    #[test]
    fn missing_volume_column_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("IDX.csv"),
            "Date,Open,High,Low,Close\n2024-01-02,10,11,9,10.5\n",
        )
        .unwrap();

        let provider = CsvPriceProvider::new(dir.path());
        let h = provider
            .get_prices("IDX", d(2024, 1, 1), d(2024, 1, 31))
            .unwrap();
        assert_eq!(h.len(), 1);
        assert!(h.volumes().is_none());
    }

    #[test]
    fn blank_volume_cell_drops_only_that_bar() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("GAP.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-02,10,11,9,10.5,1000\n\
             2024-01-03,11,12,10,11.5,\n\
             2024-01-04,12,13,11,12.5,3000\n",
        )
        .unwrap();

        let provider = CsvPriceProvider::new(dir.path());
        let h = provider
            .get_prices("GAP", d(2024, 1, 1), d(2024, 1, 31))
            .unwrap();
        assert_eq!(h.len(), 3);
        assert!(h.volumes().is_none());

        let clean = h.without_void_bars();
        assert_eq!(clean.dates(), vec![d(2024, 1, 2), d(2024, 1, 4)]);
        assert_eq!(clean.volumes(), Some(vec![1000.0, 3000.0]));
    }

    #[test]
    fn unknown_symbol_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvPriceProvider::new(dir.path());
        let err = provider
            .get_prices("NOPE", d(2024, 1, 1), d(2024, 1, 31))
            .unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn bad_number_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("BAD.csv"),
            "date,open,high,low,close\n2024-01-02,ten,11,9,10.5\n",
        )
        .unwrap();
        let provider = CsvPriceProvider::new(dir.path());
        let err = provider
            .get_prices("BAD", d(2024, 1, 1), d(2024, 1, 31))
            .unwrap_err();
        assert!(matches!(err, DataError::Malformed { .. }));
    }
}
