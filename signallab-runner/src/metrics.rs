//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity values and/or trade list in,
//! scalar out. No dependencies on the backtester, providers, or simulator.

use serde::{Deserialize, Serialize};
use signallab_core::domain::Trade;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Aggregate summary of one backtest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_trades: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub max_return: f64,
    pub max_loss: f64,
    pub profit_factor: f64,
    /// Positive fraction (0.15 = 15% peak-to-trough).
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub avg_holding_days: f64,
    pub total_return: f64,
}

impl Summary {
    /// Compute every statistic from a trade list and combined equity values.
    ///
    /// With no trades every trade statistic is zero; `total_return` still
    /// reflects the equity curve.
    pub fn compute(trades: &[Trade], equity: &[f64]) -> Self {
        let total_return = total_return(equity);
        if trades.is_empty() {
            return Self {
                total_return,
                ..Self::default()
            };
        }
        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let holding: Vec<f64> = trades.iter().map(|t| t.holding_days as f64).collect();
        Self {
            total_trades: trades.len(),
            win_rate: win_rate(trades),
            avg_return: mean_f64(&returns),
            max_return: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            max_loss: returns.iter().copied().fold(f64::INFINITY, f64::min),
            profit_factor: profit_factor(trades),
            max_drawdown: max_drawdown(equity),
            sharpe_ratio: sharpe_ratio(equity),
            avg_holding_days: mean_f64(&holding),
            total_return,
        }
    }

    /// Look up a statistic by its metric name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "total_trades" => self.total_trades as f64,
            "win_rate" => self.win_rate,
            "avg_return" => self.avg_return,
            "max_return" => self.max_return,
            "max_loss" => self.max_loss,
            "profit_factor" => self.profit_factor,
            "max_drawdown" => self.max_drawdown,
            "sharpe_ratio" => self.sharpe_ratio,
            "avg_holding_days" => self.avg_holding_days,
            "total_return" => self.total_return,
            _ => return None,
        };
        Some(value)
    }

    /// Value of a statistic as parameter search records it.
    ///
    /// Search scores `total_return` as the mean per-trade return, so a
    /// trial is not rewarded for compounding over more trades. Every
    /// other name reads the same as [`Summary::get`].
    pub fn search_metric(&self, name: &str) -> Option<f64> {
        match name {
            "total_return" => Some(self.avg_return),
            _ => self.get(name),
        }
    }

    /// `(name, value)` pairs in display order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total_trades", self.total_trades as f64),
            ("win_rate", self.win_rate),
            ("avg_return", self.avg_return),
            ("max_return", self.max_return),
            ("max_loss", self.max_loss),
            ("profit_factor", self.profit_factor),
            ("max_drawdown", self.max_drawdown),
            ("sharpe_ratio", self.sharpe_ratio),
            ("avg_holding_days", self.avg_holding_days),
            ("total_return", self.total_return),
        ]
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: last / first - 1.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if equity.len() >= 2 && first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Largest peak-to-trough decline as a positive fraction.
///
/// Returns 0.0 for empty, constant, or monotonically increasing equity.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// Annualized Sharpe ratio of daily percent changes, zero risk-free rate.
///
/// `mean × 252 / (sample std × √252)`. Returns 0.0 with fewer than two
/// changes or zero variance.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns = daily_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) * TRADING_DAYS_PER_YEAR / (std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Fraction of trades with positive pnl.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Gross profit / gross loss.
///
/// `+∞` when there is at least one winner and no loser; 0.0 when there is
/// neither.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.is_winner()).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.is_loser())
        .map(|t| t.pnl.abs())
        .sum();

    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Day-over-day percent changes of an equity series.
pub fn daily_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use signallab_core::domain::ExitReason;

    fn make_trade(pnl: f64, return_pct: f64, holding_days: i64) -> Trade {
        let entry = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        Trade {
            symbol: "SPY".into(),
            entry_date: entry,
            entry_price: 100.0,
            exit_date: entry + chrono::Duration::days(holding_days),
            exit_price: 100.0 * (1.0 + return_pct),
            shares: 10,
            pnl,
            return_pct,
            holding_days,
            exit_reason: ExitReason::SignalExit,
        }
    }

    #[test]
    fn total_return_basic() {
        assert!((total_return(&[100.0, 110.0, 120.0]) - 0.2).abs() < 1e-12);
        assert_eq!(total_return(&[100.0]), 0.0);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_known() {
        // Peak 120, trough 90 → 25%
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 110.0]);
        assert!((dd - 0.25).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_monotonic_increase() {
        assert_eq!(max_drawdown(&[100.0, 101.0, 102.0]), 0.0);
    }

    #[test]
    fn max_drawdown_empty() {
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn sharpe_constant_is_zero() {
        assert_eq!(sharpe_ratio(&[100.0; 10]), 0.0);
        assert_eq!(sharpe_ratio(&[100.0, 101.0]), 0.0);
    }

    #[test]
    fn sharpe_matches_formula() {
        let equity = [100.0, 101.0, 100.5, 102.0, 103.0];
        let r = daily_returns(&equity);
        let expected = mean_f64(&r) * 252.0 / (std_dev(&r) * 252.0_f64.sqrt());
        assert!((sharpe_ratio(&equity) - expected).abs() < 1e-12);
        assert!(sharpe_ratio(&equity) > 0.0);
    }

    #[test]
    fn profit_factor_mixed() {
        let trades = vec![
            make_trade(300.0, 0.03, 5),
            make_trade(-100.0, -0.01, 5),
            make_trade(-50.0, -0.005, 5),
        ];
        assert!((profit_factor(&trades) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_all_winners_is_infinite() {
        let trades = vec![make_trade(100.0, 0.01, 3), make_trade(50.0, 0.005, 3)];
        assert!(profit_factor(&trades).is_infinite());
        assert!(profit_factor(&trades) > 0.0);
    }

    #[test]
    fn profit_factor_flat_trades_is_zero() {
        assert_eq!(profit_factor(&[make_trade(0.0, 0.0, 3)]), 0.0);
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn summary_empty_trades_is_zeroed() {
        let summary = Summary::compute(&[], &[100.0, 110.0]);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.profit_factor, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
        assert!((summary.total_return - 0.1).abs() < 1e-12);
    }

    #[test]
    fn summary_with_trades() {
        let trades = vec![
            make_trade(200.0, 0.02, 4),
            make_trade(-100.0, -0.01, 6),
            make_trade(100.0, 0.01, 8),
        ];
        let summary = Summary::compute(&trades, &[100.0, 102.0, 101.0, 103.0]);
        assert_eq!(summary.total_trades, 3);
        assert!((summary.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((summary.avg_return - 0.02 / 3.0).abs() < 1e-12);
        assert_eq!(summary.max_return, 0.02);
        assert_eq!(summary.max_loss, -0.01);
        assert!((summary.profit_factor - 3.0).abs() < 1e-12);
        assert!((summary.avg_holding_days - 6.0).abs() < 1e-12);
        assert_eq!(summary.get("total_trades"), Some(3.0));
        assert_eq!(summary.get("bogus"), None);
    }

    #[test]
    fn search_metric_scores_total_return_per_trade() {
        let trades = vec![make_trade(200.0, 0.02, 4), make_trade(100.0, 0.04, 6)];
        let summary = Summary::compute(&trades, &[100.0, 110.0]);
        assert!((summary.total_return - 0.1).abs() < 1e-12);
        assert!((summary.search_metric("total_return").unwrap() - 0.03).abs() < 1e-12);
        assert_eq!(summary.search_metric("win_rate"), Some(1.0));
        assert_eq!(summary.search_metric("bogus"), None);
    }
}
