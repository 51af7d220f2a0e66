//! Read-only view of the market handed to the UI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Position, Timestamp, Trade, VolatilityPeriod};
use crate::price_model::PriceMove;

/// Owned copy of everything the UI renders. Taking one never mutates the
/// engine, and holding one never blocks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub prices: BTreeMap<String, f64>,
    pub price_moves: BTreeMap<String, PriceMove>,
    /// Oldest-first per instrument.
    pub candles: BTreeMap<String, Vec<Candle>>,
    pub positions: BTreeMap<String, Position>,
    pub balance: f64,
    /// Most-recent-first.
    pub trade_history: Vec<Trade>,
    pub active_volatility_periods: BTreeMap<String, VolatilityPeriod>,
    pub net_worth: f64,
    pub last_tick: Option<Timestamp>,
}

impl MarketSnapshot {
    pub fn price(&self, instrument_id: &str) -> Option<f64> {
        self.prices.get(instrument_id).copied()
    }

    pub fn owns(&self, instrument_id: &str) -> bool {
        self.positions.contains_key(instrument_id)
    }

    pub fn unrealized_pnl(&self, instrument_id: &str) -> Option<f64> {
        let position = self.positions.get(instrument_id)?;
        let price = self.price(instrument_id)?;
        Some(position.unrealized_pnl(price))
    }

    pub fn is_bull_run(&self, instrument_id: &str) -> bool {
        self.active_volatility_periods.contains_key(instrument_id)
    }
}
