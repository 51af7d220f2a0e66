//! Market configuration: instrument catalogue plus engine constants.
//!
//! Loaded from TOML. Every field has a default, so a file only needs to list
//! what it overrides:
//!
//! ```toml
//! seed = 7
//! initial_balance = 250.0
//!
//! [constants]
//! candle_duration_ms = 5000
//!
//! [[instruments]]
//! id = "pizza"
//! name = "Pizza"
//! symbol = "PZA"
//! base_price = 2.54
//! volatility = 0.15
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Instrument, InstrumentError};

/// Upper bound for every `*_ms` constant: one year. Keeps timestamp
/// arithmetic on `i64` far from overflow.
pub const MAX_DURATION_MS: u64 = 365 * 24 * 60 * 60 * 1_000;

/// Timing and tuning constants for one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConstants {
    /// Interval between price ticks when the engine is driven in real time.
    pub price_tick_ms: u64,
    /// Width of one OHLC candle window.
    pub candle_duration_ms: u64,
    /// Cadence of the bull-run spawn check.
    pub volatility_check_ms: u64,
    /// Length of one bull run.
    pub volatility_duration_ms: u64,
    /// Volatility amplification applied while a bull run is active.
    pub volatility_period_multiplier: f64,
    /// Global scale applied to every instrument's volatility.
    pub volatility_multiplier: f64,
    /// Chance that a spawn check starts a bull run.
    pub spawn_probability: f64,
    /// Price cap during a bull run, as a multiple of the starting price.
    pub max_gain_factor: f64,
    /// Candles retained per instrument.
    pub max_candles: usize,
    /// Trades retained in the history log.
    pub trade_history_cap: usize,
}

impl Default for EngineConstants {
    fn default() -> Self {
        Self {
            price_tick_ms: 300,
            candle_duration_ms: 2_000,
            volatility_check_ms: 10_000,
            volatility_duration_ms: 30_000,
            volatility_period_multiplier: 3.0,
            volatility_multiplier: 1.0,
            spawn_probability: 0.1,
            max_gain_factor: 5.0,
            max_candles: 60,
            trade_history_cap: 50,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Master seed. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Balance after initialization and reset.
    pub initial_balance: f64,
    pub constants: EngineConstants,
    pub instruments: Vec<Instrument>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            seed: None,
            initial_balance: 100.0,
            constants: EngineConstants::default(),
            instruments: default_instruments(),
        }
    }
}

/// The food-stall catalogue the game ships with.
pub fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("pizza", "Pizza", "PZA", 2.54, 0.15),
        Instrument::new("shawarma", "Shawarma", "SHW", 4.20, 0.08),
        Instrument::new("burger", "Burger", "BRG", 3.10, 0.10),
        Instrument::new("taco", "Taco", "TCO", 1.75, 0.12),
        Instrument::new("sushi", "Sushi", "SSH", 6.80, 0.06),
        Instrument::new("donut", "Donut", "DNT", 0.95, 0.20),
    ]
}

impl MarketConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: MarketConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Look up an instrument definition by id.
    pub fn instrument(&self, id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }
        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            instrument.validate()?;
            if !seen.insert(instrument.id.as_str()) {
                return Err(ConfigError::DuplicateInstrument(instrument.id.clone()));
            }
        }

        if !self.initial_balance.is_finite() || self.initial_balance < 0.0 {
            return Err(ConfigError::InvalidConstant {
                name: "initial_balance",
                reason: "must be non-negative and finite",
            });
        }

        let c = &self.constants;
        let positive_durations = [
            ("price_tick_ms", c.price_tick_ms),
            ("candle_duration_ms", c.candle_duration_ms),
            ("volatility_check_ms", c.volatility_check_ms),
            ("volatility_duration_ms", c.volatility_duration_ms),
        ];
        for (name, value) in positive_durations {
            if value == 0 {
                return Err(ConfigError::InvalidConstant {
                    name,
                    reason: "must be greater than zero",
                });
            }
            if value > MAX_DURATION_MS {
                return Err(ConfigError::InvalidConstant {
                    name,
                    reason: "must be at most one year",
                });
            }
        }
        if c.max_candles == 0 {
            return Err(ConfigError::InvalidConstant {
                name: "max_candles",
                reason: "must be greater than zero",
            });
        }
        if c.trade_history_cap == 0 {
            return Err(ConfigError::InvalidConstant {
                name: "trade_history_cap",
                reason: "must be greater than zero",
            });
        }
        if !c.volatility_period_multiplier.is_finite() || c.volatility_period_multiplier < 1.0 {
            return Err(ConfigError::InvalidConstant {
                name: "volatility_period_multiplier",
                reason: "must be at least 1.0",
            });
        }
        if !c.volatility_multiplier.is_finite() || c.volatility_multiplier < 0.0 {
            return Err(ConfigError::InvalidConstant {
                name: "volatility_multiplier",
                reason: "must be non-negative and finite",
            });
        }
        if !(0.0..=1.0).contains(&c.spawn_probability) {
            return Err(ConfigError::InvalidConstant {
                name: "spawn_probability",
                reason: "must be within [0, 1]",
            });
        }
        if !c.max_gain_factor.is_finite() || c.max_gain_factor <= 1.0 {
            return Err(ConfigError::InvalidConstant {
                name: "max_gain_factor",
                reason: "must be greater than 1.0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse market config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render market config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error("market config has no instruments")]
    NoInstruments,

    #[error("duplicate instrument id '{0}'")]
    DuplicateInstrument(String),

    #[error("invalid constant {name}: {reason}")]
    InvalidConstant {
        name: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MarketConfig::default().validate().is_ok());
    }

    #[test]
    fn default_catalogue_contains_pizza() {
        let config = MarketConfig::default();
        let pizza = config.instrument("pizza").unwrap();
        assert_eq!(pizza.base_price, 2.54);
        assert_eq!(pizza.volatility, 0.15);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = MarketConfig::from_toml(
            r#"
seed = 7

[constants]
candle_duration_ms = 5000

[[instruments]]
id = "pizza"
name = "Pizza"
symbol = "PZA"
base_price = 2.54
volatility = 0.15
"#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(7));
        assert_eq!(config.initial_balance, 100.0);
        assert_eq!(config.constants.candle_duration_ms, 5_000);
        assert_eq!(config.constants.max_candles, 60);
        assert_eq!(config.instruments.len(), 1);
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = MarketConfig::default();
        config.seed = Some(99);
        let text = config.to_toml_string().unwrap();
        let back = MarketConfig::from_toml(&text).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut config = MarketConfig::default();
        config.instruments.push(Instrument::new("pizza", "Pizza 2", "PZ2", 1.0, 0.1));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateInstrument(id)) if id == "pizza"
        ));
    }

    #[test]
    fn rejects_empty_catalogue() {
        let config = MarketConfig {
            instruments: vec![],
            ..MarketConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoInstruments)));
    }

    #[test]
    fn rejects_bad_constants() {
        let mut config = MarketConfig::default();
        config.constants.volatility_period_multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConstant { name: "volatility_period_multiplier", .. })
        ));

        let mut config = MarketConfig::default();
        config.constants.spawn_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = MarketConfig::default();
        config.constants.candle_duration_ms = 0;
        assert!(config.validate().is_err());

        let mut config = MarketConfig::default();
        config.constants.max_gain_factor = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_durations_past_one_year() {
        let mut config = MarketConfig::default();
        config.constants.volatility_duration_ms = MAX_DURATION_MS;
        assert!(config.validate().is_ok());

        for value in [MAX_DURATION_MS + 1, i64::MAX as u64 + 1, u64::MAX] {
            let mut config = MarketConfig::default();
            config.constants.volatility_duration_ms = value;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidConstant { name: "volatility_duration_ms", .. })
            ));
        }

        let toml = format!("[constants]\nprice_tick_ms = {}\n", u64::MAX);
        assert!(MarketConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn rejects_bad_instrument() {
        let mut config = MarketConfig::default();
        config.instruments[0].base_price = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Instrument(_))));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            MarketConfig::from_toml("seed = \"not a number\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
