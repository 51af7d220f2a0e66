use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential trade ID, unique for the life of an engine (survives save/load).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{:06}", self.0)
    }
}

/// Monotonic trade ID generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGen {
    next: u64,
}

impl Default for IdGen {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdGen {
    /// Resume from a persisted counter.
    pub fn starting_at(next: u64) -> Self {
        Self { next: next.max(1) }
    }

    pub fn next_trade_id(&mut self) -> TradeId {
        let id = TradeId(self.next);
        self.next += 1;
        id
    }

    /// The ID the next call will hand out.
    pub fn peek(&self) -> u64 {
        self.next
    }
}
