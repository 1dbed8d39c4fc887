//! Single-symbol position simulator.
//!
//! Per bar `i`, in order:
//!
//! 1. Fill a pending entry at `open[i]` (flat only).
//! 2. Long: fold `close[i]` into the high watermark; from the bar after the
//!    fill bar onward, evaluate exit rules against `close[i]` and sell at that
//!    close when one fires.
//! 3. Flat and the combined signal is true: schedule an entry for bar `i + 1`,
//!    provided at least one bar remains after that fill.
//! 4. Mark to market: equity = cash + shares × close.
//!
//! A position still open after the last bar is closed at the final close
//! with reason `signal_exit`. Every trade therefore exits strictly after it
//! enters.

use super::state::{Position, PositionState, SimulationConfig};
use crate::domain::{EquityCurve, EquityPoint, ExitReason, PriceHistory, Trade};

/// Trades and equity curve of one symbol run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    pub equity: EquityCurve,
}

/// Run the state machine over `history` with the combined entry `signal`.
///
/// `signal` is indexed like `history.bars`; missing trailing entries count as
/// false.
pub fn simulate(
    history: &PriceHistory,
    signal: &[bool],
    config: &SimulationConfig,
) -> SimulationOutcome {
    let bars = &history.bars;
    let n = bars.len();
    let mut state = PositionState::Flat;
    let mut cash = config.cash;
    let mut pending_entry = false;
    let mut trades = Vec::new();
    let mut points = Vec::with_capacity(n);

    for i in 0..n {
        let bar = &bars[i];

        if std::mem::take(&mut pending_entry) && state.is_flat() {
            if let Some(position) = open_position(i, bar.open, cash, config.commission) {
                cash -= position.cost;
                state = PositionState::Long(position);
            }
        }

        state = match state {
            PositionState::Long(mut position) => {
                position.high_watermark = position.high_watermark.max(bar.close);
                let reason = if i > position.entry_index {
                    config.exit_rules.first_triggered(
                        bar.close,
                        position.entry_price,
                        position.high_watermark,
                        position.bars_held(i),
                    )
                } else {
                    None
                };
                match reason {
                    Some(reason) => {
                        let (trade, proceeds) =
                            close_position(history, &position, i, reason, config.commission);
                        cash += proceeds;
                        trades.push(trade);
                        PositionState::Flat
                    }
                    None => PositionState::Long(position),
                }
            }
            PositionState::Flat => PositionState::Flat,
        };

        if state.is_flat() && signal.get(i).copied().unwrap_or(false) && i + 2 < n {
            pending_entry = true;
        }

        let held = state.position().map_or(0.0, |p| p.market_value(bar.close));
        points.push(EquityPoint {
            date: bar.date,
            value: cash + held,
        });
    }

    if let PositionState::Long(position) = state {
        let last = n - 1;
        let (trade, proceeds) = close_position(
            history,
            &position,
            last,
            ExitReason::SignalExit,
            config.commission,
        );
        cash += proceeds;
        trades.push(trade);
        if let Some(point) = points.last_mut() {
            point.value = cash;
        }
    }

    SimulationOutcome {
        trades,
        equity: EquityCurve::new(points),
    }
}

fn open_position(index: usize, price: f64, cash: f64, commission: f64) -> Option<Position> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let unit_cost = price * (1.0 + commission);
    let shares = (cash / unit_cost).floor();
    if shares < 1.0 {
        return None;
    }
    let shares = shares as u64;
    Some(Position {
        entry_index: index,
        entry_price: price,
        high_watermark: price,
        shares,
        cost: shares as f64 * unit_cost,
    })
}

/// Returns the trade and the cash received for the sale.
fn close_position(
    history: &PriceHistory,
    position: &Position,
    exit_index: usize,
    reason: ExitReason,
    commission: f64,
) -> (Trade, f64) {
    let entry_bar = &history.bars[position.entry_index];
    let exit_bar = &history.bars[exit_index];
    let exit_price = exit_bar.close;
    let proceeds = position.shares as f64 * exit_price * (1.0 - commission);

    let trade = Trade {
        symbol: history.symbol.clone(),
        entry_date: entry_bar.date,
        entry_price: position.entry_price,
        exit_date: exit_bar.date,
        exit_price,
        shares: position.shares,
        pnl: proceeds - position.cost,
        return_pct: exit_price / position.entry_price - 1.0,
        holding_days: (exit_bar.date - entry_bar.date).num_days(),
        exit_reason: reason,
    };
    (trade, proceeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ExitRule, ExitRules};
    use crate::domain::Bar;
    use chrono::{Duration, NaiveDate};

    fn history(closes: &[f64]) -> PriceHistory {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Bar {
                    date: base + Duration::days(i as i64),
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: Some(1_000),
                }
            })
            .collect();
        PriceHistory::new("TEST", bars)
    }

    fn signal_at(n: usize, at: &[usize]) -> Vec<bool> {
        (0..n).map(|i| at.contains(&i)).collect()
    }

    fn config(rules: ExitRules) -> SimulationConfig {
        SimulationConfig {
            cash: 10_000.0,
            ..SimulationConfig::default()
        }
        .with_exit_rules(rules)
    }

    #[test]
    fn entry_fills_at_next_open() {
        let h = history(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let out = simulate(&h, &signal_at(5, &[1]), &config(ExitRules::default()));
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        // open of bar 2 is close of bar 1
        assert_eq!(t.entry_price, 101.0);
        assert_eq!(t.entry_date, h.bars[2].date);
        assert_eq!(t.exit_date, h.bars[4].date);
        assert_eq!(t.exit_reason, ExitReason::SignalExit);
        assert_eq!(t.shares, 99);
        assert_eq!(t.holding_days, 2);
    }

    #[test]
    fn stop_loss_fires_on_close() {
        let h = history(&[100.0, 100.0, 100.0, 95.0, 89.0, 80.0, 85.0]);
        let rules = ExitRules::default().with(ExitRule::StopLoss(-0.10));
        let out = simulate(&h, &signal_at(7, &[1]), &config(rules));
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
        assert_eq!(t.exit_price, 89.0);
        assert!(t.return_pct <= -0.10);
    }

    #[test]
    fn exits_not_checked_on_fill_bar() {
        // fill at open 100 on bar 2, close collapses on the same bar
        let h = history(&[100.0, 100.0, 50.0, 50.0]);
        let rules = ExitRules::default().with(ExitRule::StopLoss(-0.10));
        let out = simulate(&h, &signal_at(4, &[1]), &config(rules));
        let t = &out.trades[0];
        assert_eq!(t.entry_date, h.bars[2].date);
        assert_eq!(t.exit_date, h.bars[3].date);
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn take_profit_and_max_holding() {
        let h = history(&[100.0, 100.0, 100.0, 110.0, 125.0, 126.0]);
        let rules = ExitRules::default().with(ExitRule::TakeProfit(0.2));
        let out = simulate(&h, &signal_at(6, &[1]), &config(rules));
        assert_eq!(out.trades[0].exit_reason, ExitReason::TakeProfit);
        assert_eq!(out.trades[0].exit_price, 125.0);

        let flat = history(&[100.0; 10]);
        let rules = ExitRules::default().with(ExitRule::MaxHoldingDays(3));
        let out = simulate(&flat, &signal_at(10, &[0]), &config(rules));
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::MaxHoldingDays);
        // filled on bar 1, three bars later is bar 4
        assert_eq!(t.exit_date, flat.bars[4].date);
    }

    #[test]
    fn trailing_stop_tracks_high_watermark() {
        let h = history(&[100.0, 100.0, 100.0, 120.0, 130.0, 122.0, 110.0]);
        let rules = ExitRules::default().with(ExitRule::TrailingStop(-0.05));
        let out = simulate(&h, &signal_at(7, &[1]), &config(rules));
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::TrailingStop);
        // watermark 130, trail at 123.5: first close at or below is 122
        assert_eq!(t.exit_price, 122.0);
    }

    #[test]
    fn one_position_at_a_time() {
        let h = history(&[100.0; 12]);
        let all = vec![true; 12];
        let rules = ExitRules::default().with(ExitRule::MaxHoldingDays(2));
        let out = simulate(&h, &all, &config(rules));
        for pair in out.trades.windows(2) {
            assert!(pair[1].entry_date > pair[0].exit_date);
        }
        assert!(out.trades.len() >= 2);
    }

    #[test]
    fn signal_on_last_bars_is_ignored() {
        let h = history(&[100.0, 101.0, 102.0]);
        let out = simulate(&h, &signal_at(3, &[1, 2]), &config(ExitRules::default()));
        assert!(out.trades.is_empty());
        assert_eq!(out.equity.len(), 3);
        assert!(out.equity.values().iter().all(|&v| v == 10_000.0));
    }

    #[test]
    fn equity_tracks_cash_plus_holdings() {
        let h = history(&[100.0, 100.0, 110.0, 120.0]);
        let out = simulate(&h, &signal_at(4, &[0]), &config(ExitRules::default()));
        let values = out.equity.values();
        assert_eq!(values[0], 10_000.0);
        // 100 shares bought at 100 on bar 1
        assert_eq!(values[1], 10_000.0);
        assert_eq!(values[2], 11_000.0);
        assert_eq!(values[3], 12_000.0);
        assert_eq!(out.trades[0].pnl, 2_000.0);
    }

    #[test]
    fn commission_charged_both_ways() {
        let h = history(&[100.0, 100.0, 100.0, 100.0]);
        let cfg = SimulationConfig {
            cash: 10_000.0,
            commission: 0.01,
            ..SimulationConfig::default()
        };
        let out = simulate(&h, &signal_at(4, &[0]), &cfg);
        let t = &out.trades[0];
        assert_eq!(t.shares, 99);
        assert!(t.pnl < 0.0);
        assert!((t.pnl - (99.0 * 100.0 * 0.99 - 99.0 * 101.0)).abs() < 1e-9);
    }

    #[test]
    fn too_little_cash_skips_entry() {
        let h = history(&[100.0; 5]);
        let cfg = SimulationConfig {
            cash: 50.0,
            ..SimulationConfig::default()
        };
        let out = simulate(&h, &vec![true; 5], &cfg);
        assert!(out.trades.is_empty());
    }
}
