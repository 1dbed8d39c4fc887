//! Simulation configuration and per-symbol position state.

use serde::{Deserialize, Serialize};

use crate::components::{EntryRule, ExitRules};

pub const DEFAULT_CASH: f64 = 1_000_000.0;

/// Immutable configuration for one symbol run.
///
/// Passed by reference into [`simulate`](super::simulate); nothing about a
/// run is stored anywhere else, so concurrent runs cannot interfere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub cash: f64,
    /// Commission rate charged on both fills (0.001 = 10 bps).
    pub commission: f64,
    pub entry_rule: EntryRule,
    pub exit_rules: ExitRules,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cash: DEFAULT_CASH,
            commission: 0.0,
            entry_rule: EntryRule::NextDayOpen,
            exit_rules: ExitRules::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_exit_rules(mut self, exit_rules: ExitRules) -> Self {
        self.exit_rules = exit_rules;
        self
    }
}

/// An open long position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Bar index of the entry fill.
    pub entry_index: usize,
    pub entry_price: f64,
    /// Highest close seen since entry (starts at the entry price).
    pub high_watermark: f64,
    pub shares: u64,
    /// Cash paid including commission.
    pub cost: f64,
}

impl Position {
    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.entry_index)
    }

    pub fn market_value(&self, close: f64) -> f64 {
        self.shares as f64 * close
    }
}

/// Per-symbol state machine: `Flat → Long → Flat`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long(Position),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Flat => None,
            PositionState::Long(p) => Some(p),
        }
    }
}
