//! Candle: one OHLC window of the price chart.

use super::Timestamp;
use serde::{Deserialize, Serialize};

/// OHLC candle for a single instrument over one candle window.
///
/// `timestamp` is the window start (the time of the tick that opened it).
/// `volume` is carried for chart compatibility but never populated; it stays
/// `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A fresh candle where every OHLC field equals the opening tick.
    pub fn opened_at(timestamp: Timestamp, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// Fold another tick into this candle. Open and timestamp never change.
    pub fn absorb(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// `low <= open, close <= high`, all prices positive and finite.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.low > 0.0
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= 0.0
    }
}
