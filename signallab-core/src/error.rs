//! Configuration errors raised while assembling a run.
//!
//! All of these surface synchronously from the builder calls, before any
//! price data is fetched or simulated.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Signal name not present in the registry.
    #[error("unknown signal '{name}' (available: {})", available.join(", "))]
    UnknownSignal {
        name: String,
        available: Vec<String>,
    },

    /// Entry rule outside the allowed set.
    #[error("unknown entry rule '{name}' (available: {})", available.join(", "))]
    UnknownEntryRule {
        name: String,
        available: Vec<String>,
    },

    /// Exit rule outside the allowed set.
    #[error("unknown exit rule '{name}' (available: {})", available.join(", "))]
    UnknownExitRule {
        name: String,
        available: Vec<String>,
    },

    /// A parameter is unknown to its component or has an invalid value.
    #[error("invalid parameter '{param}' for {component}: {reason}")]
    InvalidParameter {
        component: String,
        param: String,
        reason: String,
    },

    /// A run was requested with no signal attached.
    #[error("no signals configured; add at least one signal before running")]
    NoSignals,
}

impl ConfigError {
    pub(crate) fn invalid(component: &str, param: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            component: component.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_signal_lists_choices() {
        let err = ConfigError::UnknownSignal {
            name: "foo".into(),
            available: vec!["golden_cross".into(), "macd_cross".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown signal 'foo' (available: golden_cross, macd_cross)"
        );
    }
}
