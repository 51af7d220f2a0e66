//! Trade: an executed buy or sell, as recorded in the history log.

use super::ids::TradeId;
use super::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Immutable record of one executed trade.
///
/// For buys `total` is the currency spent; for sells it is the proceeds
/// (`quantity × price`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub instrument_id: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub total: f64,
    pub timestamp: Timestamp,
}

impl Trade {
    /// Signed effect on the shared balance.
    pub fn balance_delta(&self) -> f64 {
        match self.side {
            TradeSide::Buy => -self.total,
            TradeSide::Sell => self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade(side: TradeSide) -> Trade {
        Trade {
            id: TradeId(7),
            instrument_id: "pizza".into(),
            side,
            quantity: 10.0,
            price: 2.0,
            total: 20.0,
            timestamp: 1_000,
        }
    }

    #[test]
    fn balance_delta_sign_follows_side() {
        assert_eq!(sample_trade(TradeSide::Buy).balance_delta(), -20.0);
        assert_eq!(sample_trade(TradeSide::Sell).balance_delta(), 20.0);
    }

    #[test]
    fn side_serializes_lowercase() {
        let json = serde_json::to_string(&sample_trade(TradeSide::Sell)).unwrap();
        assert!(json.contains("\"side\":\"sell\""));
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample_trade(TradeSide::Sell));
    }
}
