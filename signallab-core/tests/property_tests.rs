//! Property tests for simulator invariants.
//!
//! Uses proptest to verify, over random price paths and signal patterns:
//! 1. Every trade exits strictly after it enters, and holding_days is the
//!    calendar-day difference
//! 2. A stop-loss never loses more than the stop plus one bar of movement
//! 3. Trades never overlap (one position at a time)
//! 4. Detectors always return one flag per bar

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use signallab_core::components::{builtin_registry, create_signal, ExitRule, ExitRules, SignalConfig};
use signallab_core::domain::{Bar, PriceHistory};
use signallab_core::engine::{simulate, SimulationConfig};

const MAX_DAILY_MOVE: f64 = 0.02;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_moves() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-MAX_DAILY_MOVE..MAX_DAILY_MOVE, 30..150)
}

fn arb_gaps() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..4, 150)
}

fn history_from(moves: &[f64], gaps: &[i64]) -> PriceHistory {
    let mut date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut close = 100.0;
    let mut bars = Vec::with_capacity(moves.len());
    for (i, m) in moves.iter().enumerate() {
        let open = close;
        close *= 1.0 + m;
        bars.push(Bar {
            date,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: Some(1_000),
        });
        date += Duration::days(gaps[i % gaps.len()]);
    }
    PriceHistory::new("PROP", bars)
}

proptest! {
    #[test]
    fn trades_exit_after_entry(
        moves in arb_moves(),
        gaps in arb_gaps(),
        signal_seed in any::<u64>(),
        hold in 1usize..10,
    ) {
        let history = history_from(&moves, &gaps);
        let signal: Vec<bool> = (0..history.len())
            .map(|i| (signal_seed >> (i % 64)) & 1 == 1)
            .collect();
        let config = SimulationConfig::default()
            .with_exit_rules(ExitRules::default().with(ExitRule::MaxHoldingDays(hold)));

        let out = simulate(&history, &signal, &config);
        for t in &out.trades {
            prop_assert!(t.exit_date > t.entry_date);
            prop_assert_eq!(t.holding_days, (t.exit_date - t.entry_date).num_days());
        }
        for pair in out.trades.windows(2) {
            prop_assert!(pair[1].entry_date > pair[0].exit_date);
        }
        prop_assert_eq!(out.equity.len(), history.len());
    }

    #[test]
    fn stop_loss_bounded_by_one_bar(
        moves in arb_moves(),
        gaps in arb_gaps(),
        stop in -0.15f64..-0.02,
    ) {
        let history = history_from(&moves, &gaps);
        let signal = vec![true; history.len()];
        let config = SimulationConfig::default()
            .with_exit_rules(ExitRules::default().with(ExitRule::StopLoss(stop)));

        let out = simulate(&history, &signal, &config);
        let floor = (1.0 + stop) * (1.0 - MAX_DAILY_MOVE) - 1.0 - 1e-9;
        for t in &out.trades {
            prop_assert!(
                t.return_pct >= floor,
                "return {} below floor {} (stop {})", t.return_pct, floor, stop
            );
        }
    }

    #[test]
    fn detectors_preserve_length(moves in arb_moves(), gaps in arb_gaps()) {
        let history = history_from(&moves, &gaps);
        for name in builtin_registry().names() {
            let detector = create_signal(&SignalConfig::new(name)).unwrap();
            prop_assert_eq!(detector.detect(&history).len(), history.len());
        }
    }
}
