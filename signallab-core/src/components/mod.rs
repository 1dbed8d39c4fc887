//! Strategy components: signal detectors, their registry, and entry/exit rules.

pub mod factory;
pub mod rules;
pub mod signal;

pub use factory::{builtin_registry, create_signal, SignalFactory, SignalRegistry};
pub use rules::{EntryRule, ExitRule, ExitRules, ENTRY_RULES, EXIT_RULES};
pub use signal::{combine_any, Direction, SignalConfig, SignalDetector};
