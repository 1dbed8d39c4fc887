//! Entry and exit rules.
//!
//! Rules are validated when they are added, never during simulation. Exit
//! rules are kept in an immutable [`ExitRules`] value that the simulator
//! evaluates in a fixed priority order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ExitReason;
use crate::error::ConfigError;

pub const ENTRY_RULES: &[&str] = &["next_day_open"];
pub const EXIT_RULES: &[&str] = &[
    "stop_loss",
    "take_profit",
    "max_holding_days",
    "trailing_stop",
];

/// How an entry signal is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRule {
    /// Market buy filled at the open of the bar after the signal.
    #[default]
    NextDayOpen,
}

impl EntryRule {
    pub fn from_config(name: &str, params: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        match name {
            "next_day_open" => {
                if let Some(key) = params.keys().next() {
                    return Err(ConfigError::invalid(name, key, "takes no parameters"));
                }
                Ok(EntryRule::NextDayOpen)
            }
            _ => Err(ConfigError::UnknownEntryRule {
                name: name.to_string(),
                available: ENTRY_RULES.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

/// One validated exit rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitRule {
    /// Negative fraction of the entry price.
    StopLoss(f64),
    /// Positive fraction of the entry price.
    TakeProfit(f64),
    /// Bars held since the fill bar.
    MaxHoldingDays(usize),
    /// Negative fraction of the high watermark.
    TrailingStop(f64),
}

impl ExitRule {
    /// Parse and validate a rule by name.
    ///
    /// `stop_loss`, `take_profit` and `trailing_stop` read `threshold`
    /// (defaults -0.10, 0.20, -0.05); `max_holding_days` reads `days`
    /// (default 30).
    pub fn from_config(name: &str, params: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let expected = match name {
            "max_holding_days" => "days",
            "stop_loss" | "take_profit" | "trailing_stop" => "threshold",
            _ => {
                return Err(ConfigError::UnknownExitRule {
                    name: name.to_string(),
                    available: EXIT_RULES.iter().map(|s| s.to_string()).collect(),
                })
            }
        };
        if let Some(key) = params.keys().find(|k| k.as_str() != expected) {
            return Err(ConfigError::invalid(
                name,
                key,
                format!("unknown parameter (expected '{expected}')"),
            ));
        }

        let get = |default: f64| -> Result<f64, ConfigError> {
            let value = params.get(expected).copied().unwrap_or(default);
            if value.is_finite() {
                Ok(value)
            } else {
                Err(ConfigError::invalid(name, expected, "must be finite"))
            }
        };

        match name {
            "stop_loss" => {
                let threshold = get(-0.10)?;
                if threshold >= 0.0 {
                    return Err(ConfigError::invalid(
                        name,
                        expected,
                        format!("must be negative, got {threshold}"),
                    ));
                }
                Ok(ExitRule::StopLoss(threshold))
            }
            "take_profit" => {
                let threshold = get(0.20)?;
                if threshold <= 0.0 {
                    return Err(ConfigError::invalid(
                        name,
                        expected,
                        format!("must be positive, got {threshold}"),
                    ));
                }
                Ok(ExitRule::TakeProfit(threshold))
            }
            "trailing_stop" => {
                let threshold = get(-0.05)?;
                if threshold >= 0.0 || threshold <= -1.0 {
                    return Err(ConfigError::invalid(
                        name,
                        expected,
                        format!("must be in (-1, 0), got {threshold}"),
                    ));
                }
                Ok(ExitRule::TrailingStop(threshold))
            }
            _ => {
                let days = get(30.0)?;
                if days < 1.0 || days.fract() != 0.0 {
                    return Err(ConfigError::invalid(
                        name,
                        expected,
                        format!("must be a whole number >= 1, got {days}"),
                    ));
                }
                Ok(ExitRule::MaxHoldingDays(days as usize))
            }
        }
    }

    pub fn reason(&self) -> ExitReason {
        match self {
            ExitRule::StopLoss(_) => ExitReason::StopLoss,
            ExitRule::TakeProfit(_) => ExitReason::TakeProfit,
            ExitRule::MaxHoldingDays(_) => ExitReason::MaxHoldingDays,
            ExitRule::TrailingStop(_) => ExitReason::TrailingStop,
        }
    }
}

/// The exit rule set of one run. At most one rule per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitRules {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub max_holding_days: Option<usize>,
    pub trailing_stop: Option<f64>,
}

impl ExitRules {
    /// Add or replace a rule.
    pub fn set(&mut self, rule: ExitRule) {
        match rule {
            ExitRule::StopLoss(v) => self.stop_loss = Some(v),
            ExitRule::TakeProfit(v) => self.take_profit = Some(v),
            ExitRule::MaxHoldingDays(v) => self.max_holding_days = Some(v),
            ExitRule::TrailingStop(v) => self.trailing_stop = Some(v),
        }
    }

    pub fn with(mut self, rule: ExitRule) -> Self {
        self.set(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// First rule that fires for the current bar, in priority order:
    /// stop_loss, take_profit, max_holding_days, trailing_stop.
    pub fn first_triggered(
        &self,
        close: f64,
        entry_price: f64,
        high_watermark: f64,
        bars_held: usize,
    ) -> Option<ExitReason> {
        if let Some(s) = self.stop_loss {
            if close <= entry_price * (1.0 + s) {
                return Some(ExitReason::StopLoss);
            }
        }
        if let Some(t) = self.take_profit {
            if close >= entry_price * (1.0 + t) {
                return Some(ExitReason::TakeProfit);
            }
        }
        if let Some(n) = self.max_holding_days {
            if bars_held >= n {
                return Some(ExitReason::MaxHoldingDays);
            }
        }
        if let Some(r) = self.trailing_stop {
            if close <= high_watermark * (1.0 + r) {
                return Some(ExitReason::TrailingStop);
            }
        }
        None
    }
}
