//! Position simulation — the per-symbol entry/exit state machine.

pub mod simulator;
pub mod state;

pub use simulator::{simulate, SimulationOutcome};
pub use state::{Position, PositionState, SimulationConfig, DEFAULT_CASH};
