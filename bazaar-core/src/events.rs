//! Notifications the engine queues for the UI (toasts, chart markers).
//!
//! Each state change is reported exactly once: a bull run produces one
//! `VolatilityStarted` and one `VolatilityEnded`, never one per tick.

use serde::{Deserialize, Serialize};

use crate::domain::{Timestamp, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    VolatilityStarted {
        instrument_id: String,
        start_price: f64,
        end_time: Timestamp,
        multiplier: f64,
    },
    VolatilityEnded {
        instrument_id: String,
        final_price: f64,
    },
    TradeExecuted(Trade),
    Deposited {
        amount: f64,
        balance: f64,
    },
    Reset,
}
