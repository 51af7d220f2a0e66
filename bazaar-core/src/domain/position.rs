use serde::{Deserialize, Serialize};

/// Owned units of one instrument and their volume-weighted average cost.
///
/// A position only exists while `quantity > 0`; the ledger removes the entry
/// on a full sell instead of storing a zero row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: f64,
    pub average_cost: f64,
}

impl Position {
    pub fn new(quantity: f64, average_cost: f64) -> Self {
        Self {
            quantity,
            average_cost,
        }
    }

    /// Total currency paid for the units currently held.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.average_cost
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.quantity * (current_price - self.average_cost)
    }

    /// Unrealized return as a fraction of cost basis.
    pub fn unrealized_return(&self, current_price: f64) -> f64 {
        if self.average_cost <= 0.0 {
            return 0.0;
        }
        current_price / self.average_cost - 1.0
    }
}
