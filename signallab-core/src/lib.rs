//! SignalLab Core — domain types, price sources, indicators, signal detectors
//! and the position simulator.
//!
//! This crate contains everything needed to turn one symbol's price history
//! into trades and an equity curve:
//! - Domain types (bars, price histories, trades, equity curves)
//! - Price provider and symbol selector interfaces, with CSV, synthetic and
//!   in-memory providers and a TOML sector universe
//! - Indicator series (SMA, EMA, RSI, MACD, Bollinger, rolling reductions)
//! - Signal detectors behind a name → factory registry
//! - Entry/exit rules and the `Flat → Long → Flat` simulator

pub mod components;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;

pub use error::ConfigError;
