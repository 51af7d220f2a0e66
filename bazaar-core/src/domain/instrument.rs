use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Static definition of a tradable good.
///
/// Loaded once from configuration and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    /// Unique key used in commands, snapshots and save files.
    pub id: String,
    pub name: String,
    /// Ticker shown next to the chart (e.g. `"PZA"`).
    pub symbol: String,
    /// Price at initialization and after reset.
    pub base_price: f64,
    /// Relative step size per price tick (0.15 = up to ±15% per tick).
    pub volatility: f64,
}

impl Instrument {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        base_price: f64,
        volatility: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            symbol: symbol.into(),
            base_price,
            volatility,
        }
    }

    /// Check the definition is usable by the price model.
    pub fn validate(&self) -> Result<(), InstrumentError> {
        if self.id.trim().is_empty() {
            return Err(InstrumentError::EmptyId);
        }
        if !self.base_price.is_finite() || self.base_price <= 0.0 {
            return Err(InstrumentError::InvalidBasePrice {
                id: self.id.clone(),
                base_price: self.base_price,
            });
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(InstrumentError::InvalidVolatility {
                id: self.id.clone(),
                volatility: self.volatility,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    #[error("instrument id must not be empty")]
    EmptyId,

    #[error("instrument {id}: base price {base_price} must be positive and finite")]
    InvalidBasePrice { id: String, base_price: f64 },

    #[error("instrument {id}: volatility {volatility} must be non-negative and finite")]
    InvalidVolatility { id: String, volatility: f64 },
}
