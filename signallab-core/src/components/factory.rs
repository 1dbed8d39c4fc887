//! Signal registry — maps registry names to detector factories.
//!
//! Each factory reads its own parameters out of a [`SignalConfig`], applies
//! defaults, validates values and rejects parameter names it does not know.
//! The built-in registry is created once and shared.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::ConfigError;

use super::signal::{
    BollingerBreakout, BollingerSqueeze, Direction, MaCrossover, MacdCross, RsiThreshold,
    SignalConfig, SignalDetector, VolumeBreakout, VolumeSpike,
};

pub type SignalFactory = fn(&SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError>;

/// Name → factory table.
#[derive(Clone)]
pub struct SignalRegistry {
    factories: BTreeMap<&'static str, SignalFactory>,
}

impl std::fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl SignalRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in detector.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("golden_cross", golden_cross);
        registry.register("dead_cross", dead_cross);
        registry.register("rsi_oversold", rsi_oversold);
        registry.register("rsi_overbought", rsi_overbought);
        registry.register("macd_cross", macd_cross);
        registry.register("bollinger_breakout", bollinger_breakout);
        registry.register("bollinger_squeeze", bollinger_squeeze);
        registry.register("volume_spike", volume_spike);
        registry.register("volume_breakout", volume_breakout);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: SignalFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Build a detector from its configuration.
    pub fn create(&self, config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
        let factory =
            self.factories
                .get(config.name.as_str())
                .ok_or_else(|| ConfigError::UnknownSignal {
                    name: config.name.clone(),
                    available: self.names().into_iter().map(String::from).collect(),
                })?;
        factory(config)
    }
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The shared built-in registry.
pub fn builtin_registry() -> &'static SignalRegistry {
    static REGISTRY: OnceLock<SignalRegistry> = OnceLock::new();
    REGISTRY.get_or_init(SignalRegistry::builtin)
}

/// Build a detector through the built-in registry.
pub fn create_signal(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    builtin_registry().create(config)
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Reject parameter names the detector does not take.
fn check_known(config: &SignalConfig, known: &[&str]) -> Result<(), ConfigError> {
    match config.params.keys().find(|k| !known.contains(&k.as_str())) {
        Some(unknown) => Err(ConfigError::invalid(
            &config.name,
            unknown,
            format!("unknown parameter (expected one of: {})", known.join(", ")),
        )),
        None => Ok(()),
    }
}

/// Extract a named f64 parameter, falling back to `default`.
fn param(config: &SignalConfig, name: &str, default: f64) -> Result<f64, ConfigError> {
    let value = config.params.get(name).copied().unwrap_or(default);
    if !value.is_finite() {
        return Err(ConfigError::invalid(&config.name, name, "must be finite"));
    }
    Ok(value)
}

/// Extract a window length: a whole number >= 1.
fn param_period(config: &SignalConfig, name: &str, default: usize) -> Result<usize, ConfigError> {
    let value = param(config, name, default as f64)?;
    if value < 1.0 || value.fract() != 0.0 {
        return Err(ConfigError::invalid(
            &config.name,
            name,
            format!("must be a whole number >= 1, got {value}"),
        ));
    }
    Ok(value as usize)
}

/// `1` → up, `-1` → down; `0` → none when `allow_none`.
fn param_direction(
    config: &SignalConfig,
    name: &str,
    default: f64,
    allow_none: bool,
) -> Result<Option<Direction>, ConfigError> {
    let value = param(config, name, default)?;
    if value == 1.0 {
        Ok(Some(Direction::Up))
    } else if value == -1.0 {
        Ok(Some(Direction::Down))
    } else if value == 0.0 && allow_none {
        Ok(None)
    } else {
        let expected = if allow_none { "1, -1 or 0" } else { "1 or -1" };
        Err(ConfigError::invalid(
            &config.name,
            name,
            format!("must be {expected}, got {value}"),
        ))
    }
}

fn required_direction(
    config: &SignalConfig,
    name: &str,
    default: f64,
) -> Result<Direction, ConfigError> {
    // allow_none = false never yields None
    param_direction(config, name, default, false)?
        .ok_or_else(|| ConfigError::invalid(&config.name, name, "direction required"))
}

// ─── Factories ───────────────────────────────────────────────────────

fn golden_cross(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["short", "long"])?;
    Ok(Box::new(MaCrossover::golden(
        param_period(config, "short", 5)?,
        param_period(config, "long", 25)?,
    )))
}

fn dead_cross(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["short", "long"])?;
    Ok(Box::new(MaCrossover::dead(
        param_period(config, "short", 5)?,
        param_period(config, "long", 25)?,
    )))
}

fn rsi_oversold(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["period", "threshold"])?;
    Ok(Box::new(RsiThreshold::oversold(
        param_period(config, "period", 14)?,
        param(config, "threshold", 30.0)?,
    )))
}

fn rsi_overbought(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["period", "threshold"])?;
    Ok(Box::new(RsiThreshold::overbought(
        param_period(config, "period", 14)?,
        param(config, "threshold", 70.0)?,
    )))
}

fn macd_cross(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["fast", "slow", "signal_period"])?;
    Ok(Box::new(MacdCross::new(
        param_period(config, "fast", 12)?,
        param_period(config, "slow", 26)?,
        param_period(config, "signal_period", 9)?,
    )))
}

fn bollinger_breakout(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["period", "std_dev", "direction"])?;
    Ok(Box::new(BollingerBreakout::new(
        param_period(config, "period", 20)?,
        param(config, "std_dev", 2.0)?,
        required_direction(config, "direction", 1.0)?,
    )))
}

fn bollinger_squeeze(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(
        config,
        &["period", "std_dev", "squeeze_threshold", "direction"],
    )?;
    Ok(Box::new(BollingerSqueeze::new(
        param_period(config, "period", 20)?,
        param(config, "std_dev", 2.0)?,
        param(config, "squeeze_threshold", 0.03)?,
        required_direction(config, "direction", 1.0)?,
    )))
}

fn volume_spike(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(config, &["period", "threshold", "price_direction"])?;
    Ok(Box::new(VolumeSpike::new(
        param_period(config, "period", 20)?,
        param(config, "threshold", 2.0)?,
        param_direction(config, "price_direction", 0.0, true)?,
    )))
}

fn volume_breakout(config: &SignalConfig) -> Result<Box<dyn SignalDetector>, ConfigError> {
    check_known(
        config,
        &["price_period", "volume_period", "volume_threshold"],
    )?;
    Ok(Box::new(VolumeBreakout::new(
        param_period(config, "price_period", 20)?,
        param_period(config, "volume_period", 20)?,
        param(config, "volume_threshold", 1.5)?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_full_catalog() {
        let names = builtin_registry().names();
        for expected in [
            "golden_cross",
            "dead_cross",
            "rsi_oversold",
            "rsi_overbought",
            "macd_cross",
            "bollinger_breakout",
            "bollinger_squeeze",
            "volume_spike",
            "volume_breakout",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn every_builtin_builds_with_defaults() {
        for name in builtin_registry().names() {
            let detector = create_signal(&SignalConfig::new(name)).unwrap();
            assert_eq!(detector.name(), name);
        }
    }

    #[test]
    fn unknown_signal_enumerates_valid_names() {
        let err = create_signal(&SignalConfig::new("moon_phase")).unwrap_err();
        match err {
            ConfigError::UnknownSignal { name, available } => {
                assert_eq!(name, "moon_phase");
                assert!(available.contains(&"golden_cross".to_string()));
                assert_eq!(available.len(), builtin_registry().names().len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_parameter_rejected() {
        let config = SignalConfig::new("golden_cross").with_param("shortt", 5.0);
        assert!(matches!(
            create_signal(&config),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn zero_period_rejected() {
        let config = SignalConfig::new("rsi_oversold").with_param("period", 0.0);
        assert!(create_signal(&config).is_err());
        let config = SignalConfig::new("golden_cross").with_param("short", 2.5);
        assert!(create_signal(&config).is_err());
    }

    #[test]
    fn direction_encoding() {
        let up = SignalConfig::new("volume_spike").with_param("price_direction", 1.0);
        assert!(create_signal(&up).is_ok());
        let bad = SignalConfig::new("bollinger_breakout").with_param("direction", 0.0);
        assert!(create_signal(&bad).is_err());
    }

    #[test]
    fn custom_registration() {
        let mut registry = SignalRegistry::empty();
        registry.register("golden_cross", golden_cross);
        assert!(registry.contains("golden_cross"));
        assert!(registry.create(&SignalConfig::new("macd_cross")).is_err());
    }
}
