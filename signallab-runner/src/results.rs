//! Backtest results — trades, combined equity, summary, and breakdowns.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use signallab_core::domain::{EquityCurve, EquityPoint, Trade};

use crate::metrics::Summary;

/// One aggregated row of a breakdown table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    /// Symbol, sector, `YYYY-MM`, or year.
    pub key: String,
    pub trades: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub total_pnl: f64,
}

/// Output of one [`Backtester::run`](crate::Backtester::run).
///
/// Immutable once built. The summary is computed on first access and cached.
#[derive(Debug, Clone, Default)]
pub struct BacktestResults {
    trades: Vec<Trade>,
    equity: EquityCurve,
    summary: OnceLock<Summary>,
}

impl BacktestResults {
    pub fn new(trades: Vec<Trade>, equity: EquityCurve) -> Self {
        Self {
            trades,
            equity,
            summary: OnceLock::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity(&self) -> &EquityCurve {
        &self.equity
    }

    pub fn summary(&self) -> &Summary {
        self.summary
            .get_or_init(|| Summary::compute(&self.trades, &self.equity.values()))
    }

    /// Per-symbol rows, highest total pnl first.
    pub fn by_symbol(&self) -> Vec<BreakdownRow> {
        let mut rows = group_trades(&self.trades, |t| Some(t.symbol.clone()));
        sort_by_pnl_desc(&mut rows);
        rows
    }

    /// Per-sector rows, highest total pnl first. Trades whose symbol is
    /// missing from `sector_map` are left out.
    pub fn by_sector(&self, sector_map: &BTreeMap<String, String>) -> Vec<BreakdownRow> {
        let mut rows = group_trades(&self.trades, |t| sector_map.get(&t.symbol).cloned());
        sort_by_pnl_desc(&mut rows);
        rows
    }

    /// Rows keyed by `YYYY-MM` of the exit date, ascending.
    pub fn monthly_returns(&self) -> Vec<BreakdownRow> {
        group_trades(&self.trades, |t| Some(t.exit_date.format("%Y-%m").to_string()))
    }

    /// Rows keyed by exit year, ascending.
    pub fn yearly_returns(&self) -> Vec<BreakdownRow> {
        group_trades(&self.trades, |t| Some(t.exit_date.year().to_string()))
    }
}

fn group_trades<F>(trades: &[Trade], key_of: F) -> Vec<BreakdownRow>
where
    F: Fn(&Trade) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        if let Some(key) = key_of(trade) {
            groups.entry(key).or_default().push(trade);
        }
    }
    groups
        .into_iter()
        .map(|(key, group)| {
            let n = group.len() as f64;
            BreakdownRow {
                key,
                trades: group.len(),
                win_rate: group.iter().filter(|t| t.is_winner()).count() as f64 / n,
                avg_return: group.iter().map(|t| t.return_pct).sum::<f64>() / n,
                total_pnl: group.iter().map(|t| t.pnl).sum(),
            }
        })
        .collect()
}

fn sort_by_pnl_desc(rows: &mut [BreakdownRow]) {
    rows.sort_by(|a, b| b.total_pnl.total_cmp(&a.total_pnl));
}

// ─── Equity combination ─────────────────────────────────────────────

/// Average several per-symbol equity curves into one.
///
/// The result is indexed by the union of all dates. Each curve is
/// forward-filled, then backward-filled over that index before the values
/// are summed and divided by the number of curves.
pub fn combine_equity(curves: &[EquityCurve]) -> EquityCurve {
    let curves: Vec<&EquityCurve> = curves.iter().filter(|c| !c.is_empty()).collect();
    if curves.is_empty() {
        return EquityCurve::default();
    }

    let dates: Vec<NaiveDate> = curves
        .iter()
        .flat_map(|c| c.points.iter().map(|p| p.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut sums = vec![0.0; dates.len()];
    for curve in &curves {
        for (sum, value) in sums.iter_mut().zip(fill_onto(curve, &dates)) {
            *sum += value;
        }
    }

    let n = curves.len() as f64;
    EquityCurve::new(
        dates
            .into_iter()
            .zip(sums)
            .map(|(date, sum)| EquityPoint {
                date,
                value: sum / n,
            })
            .collect(),
    )
}

/// Values of `curve` at every date of `dates` (a superset of its own
/// dates, ascending), forward- then backward-filled.
fn fill_onto(curve: &EquityCurve, dates: &[NaiveDate]) -> Vec<f64> {
    let first = curve.first_value().unwrap_or(0.0);
    let mut points = curve.points.iter().peekable();
    let mut last: Option<f64> = None;
    dates
        .iter()
        .map(|date| {
            while let Some(point) = points.next_if(|p| p.date <= *date) {
                last = Some(point.value);
            }
            last.unwrap_or(first)
        })
        .collect()
}
