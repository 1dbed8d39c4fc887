//! Domain types for SignalLab

pub mod bar;
pub mod equity;
pub mod trade;

pub use bar::{Bar, PriceHistory};
pub use equity::{EquityCurve, EquityPoint};
pub use trade::{ExitReason, Trade};
