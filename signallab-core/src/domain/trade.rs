//! Trade — a completed round trip, created once when a position closes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHoldingDays,
    TrailingStop,
    /// Closed without a rule firing (end of data).
    SignalExit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::MaxHoldingDays => "max_holding_days",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::SignalExit => "signal_exit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long round trip: entry fill → exit fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,

    // ── Entry ──
    pub entry_date: NaiveDate,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_date: NaiveDate,
    pub exit_price: f64,

    // ── Size / PnL ──
    pub shares: u64,
    pub pnl: f64,
    /// `exit_price / entry_price - 1`.
    pub return_pct: f64,

    /// Calendar days between entry and exit.
    pub holding_days: i64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_names() {
        assert_eq!(ExitReason::MaxHoldingDays.as_str(), "max_holding_days");
        assert_eq!(ExitReason::SignalExit.to_string(), "signal_exit");
    }

    #[test]
    fn winner_and_loser_are_strict() {
        let mut t = Trade {
            symbol: "SPY".into(),
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            entry_price: 100.0,
            exit_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            exit_price: 100.0,
            shares: 10,
            pnl: 0.0,
            return_pct: 0.0,
            holding_days: 3,
            exit_reason: ExitReason::SignalExit,
        };
        assert!(!t.is_winner());
        assert!(!t.is_loser());
        t.pnl = 5.0;
        assert!(t.is_winner());
        t.pnl = -5.0;
        assert!(t.is_loser());
    }
}
