//! Persisted engine state: the JSON document a save file contains.
//!
//! Floats round-trip exactly, so restoring a saved state and saving it again
//! yields the same document. Documents with a newer schema version are
//! rejected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, MarketConfig};
use crate::domain::{Candle, Timestamp, Trade, VolatilityPeriod};
use crate::ledger::QUANTITY_EPSILON;
use crate::price_model::PRICE_EPSILON;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,
    /// Set by whoever writes the file; the engine itself leaves it empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub prices: BTreeMap<String, f64>,
    /// Oldest-first per instrument.
    pub candles: BTreeMap<String, Vec<Candle>>,
    /// Owned units per instrument. Only owned instruments appear.
    pub positions: BTreeMap<String, f64>,
    /// Average cost per owned instrument. Keys match `positions`.
    pub average_costs: BTreeMap<String, f64>,
    /// Most-recent-first.
    pub trade_history: Vec<Trade>,
    pub balance: f64,
    pub active_volatility_periods: BTreeMap<String, VolatilityPeriod>,
    #[serde(default = "first_trade_id")]
    pub next_trade_id: u64,
    #[serde(default)]
    pub last_volatility_check: Option<Timestamp>,
    #[serde(default)]
    pub last_tick: Option<Timestamp>,
    #[serde(default)]
    pub ticks_processed: u64,
}

fn first_trade_id() -> u64 {
    1
}

impl PersistedState {
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let state: PersistedState = serde_json::from_str(json)?;
        if state.schema_version > SCHEMA_VERSION {
            return Err(StateError::UnsupportedSchema {
                found: state.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(state)
    }

    /// Check the document is consistent with `config` and with the engine's
    /// invariants. Instruments in `config` that the document does not
    /// mention are fine (they start fresh); the reverse is an error.
    pub fn validate_against(&self, config: &MarketConfig) -> Result<(), StateError> {
        let known = |id: &str| config.instrument(id).is_some();

        if !self.balance.is_finite() || self.balance < 0.0 {
            return Err(StateError::InvalidBalance(self.balance));
        }

        for (id, &price) in &self.prices {
            if !known(id) {
                return Err(StateError::UnknownInstrument(id.clone()));
            }
            if !price.is_finite() || price < PRICE_EPSILON {
                return Err(StateError::InvalidPrice {
                    instrument_id: id.clone(),
                    price,
                });
            }
        }

        for (id, series) in &self.candles {
            if !known(id) {
                return Err(StateError::UnknownInstrument(id.clone()));
            }
            if let Some(index) = series.iter().position(|c| !c.is_sane()) {
                return Err(StateError::InvalidCandle {
                    instrument_id: id.clone(),
                    index,
                });
            }
        }

        if self.positions.len() != self.average_costs.len()
            || self.positions.keys().any(|id| !self.average_costs.contains_key(id))
        {
            return Err(StateError::PositionMismatch);
        }
        for (id, &quantity) in &self.positions {
            if !known(id) {
                return Err(StateError::UnknownInstrument(id.clone()));
            }
            let average_cost = self.average_costs[id];
            if !quantity.is_finite()
                || quantity <= QUANTITY_EPSILON
                || !average_cost.is_finite()
                || average_cost <= 0.0
            {
                return Err(StateError::InvalidPosition {
                    instrument_id: id.clone(),
                    quantity,
                    average_cost,
                });
            }
        }

        if self.active_volatility_periods.len() > 1 {
            return Err(StateError::OverlappingVolatility(
                self.active_volatility_periods.len(),
            ));
        }
        for (id, period) in &self.active_volatility_periods {
            if !known(id) {
                return Err(StateError::UnknownInstrument(id.clone()));
            }
            if !period.start_price.is_finite()
                || period.start_price < PRICE_EPSILON
                || !period.multiplier.is_finite()
                || period.multiplier < 1.0
            {
                return Err(StateError::InvalidVolatilityPeriod(id.clone()));
            }
            // Missing prices restart at base price, which must also fit.
            let price = match self.prices.get(id) {
                Some(&price) => price,
                None => config.instrument(id).map_or(0.0, |i| i.base_price),
            };
            let cap = period.price_cap(config.constants.max_gain_factor);
            if price > cap {
                return Err(StateError::PriceAboveCap {
                    instrument_id: id.clone(),
                    price,
                    cap,
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("malformed state document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema version {found} (max supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("state references unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("invalid price {price} for {instrument_id}")]
    InvalidPrice { instrument_id: String, price: f64 },

    #[error("candle {index} of {instrument_id} violates low <= open, close <= high")]
    InvalidCandle { instrument_id: String, index: usize },

    #[error("positions and average_costs list different instruments")]
    PositionMismatch,

    #[error("invalid position for {instrument_id}: quantity {quantity}, average cost {average_cost}")]
    InvalidPosition {
        instrument_id: String,
        quantity: f64,
        average_cost: f64,
    },

    #[error("{0} volatility periods active; at most one is allowed")]
    OverlappingVolatility(usize),

    #[error("invalid volatility period for {0}")]
    InvalidVolatilityPeriod(String),

    #[error("price {price} of {instrument_id} is above its bull-run cap {cap}")]
    PriceAboveCap {
        instrument_id: String,
        price: f64,
        cap: f64,
    },

    #[error("invalid balance {0}")]
    InvalidBalance(f64),
}
