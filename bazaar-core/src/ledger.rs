//! Portfolio ledger: shared balance, positions with volume-weighted average
//! cost, and a bounded most-recent-first trade history.
//!
//! Every operation validates first and mutates second, so a rejected trade
//! leaves balance, positions and history untouched.

use std::collections::{BTreeMap, VecDeque};

use thiserror::Error;

use crate::domain::{IdGen, Position, Timestamp, Trade, TradeSide};

/// Quantities at or below this are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error("insufficient funds: need {required:.4}, have {available:.4}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient holdings of {instrument_id}: requested {requested}, own {owned}")]
    InsufficientHoldings {
        instrument_id: String,
        requested: f64,
        owned: f64,
    },

    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("invalid amount {0}: must be positive and finite")]
    InvalidAmount(f64),
}

fn validate_amount(amount: f64) -> Result<f64, TradeError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(TradeError::InvalidAmount(amount))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioLedger {
    balance: f64,
    positions: BTreeMap<String, Position>,
    /// Front is the most recent trade.
    history: VecDeque<Trade>,
    history_cap: usize,
    ids: IdGen,
}

impl PortfolioLedger {
    pub fn new(initial_balance: f64, history_cap: usize) -> Self {
        Self {
            balance: initial_balance,
            positions: BTreeMap::new(),
            history: VecDeque::new(),
            history_cap: history_cap.max(1),
            ids: IdGen::default(),
        }
    }

    /// Rebuild a ledger from persisted parts. `history` is most-recent-first
    /// and is truncated to `history_cap`.
    pub fn from_parts(
        balance: f64,
        positions: BTreeMap<String, Position>,
        history: Vec<Trade>,
        history_cap: usize,
        next_trade_id: u64,
    ) -> Self {
        let history_cap = history_cap.max(1);
        let mut history: VecDeque<Trade> = history.into();
        history.truncate(history_cap);
        Self {
            balance,
            positions,
            history,
            history_cap,
            ids: IdGen::starting_at(next_trade_id),
        }
    }

    /// Spend `currency_amount` on `instrument_id` at `price`. Amounts too
    /// small to buy more than [`QUANTITY_EPSILON`] units are rejected.
    pub fn buy(
        &mut self,
        instrument_id: &str,
        currency_amount: f64,
        price: f64,
        now: Timestamp,
    ) -> Result<Trade, TradeError> {
        let amount = validate_amount(currency_amount)?;
        let price = validate_amount(price)?;
        if self.balance < amount {
            return Err(TradeError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }

        // Dust could never be sold back or saved.
        let units = amount / price;
        if units <= QUANTITY_EPSILON {
            return Err(TradeError::InvalidAmount(amount));
        }
        let position = match self.positions.get(instrument_id) {
            Some(existing) => {
                let quantity = existing.quantity + units;
                let average_cost = (existing.cost_basis() + amount) / quantity;
                Position::new(quantity, average_cost)
            }
            None => Position::new(units, amount / units),
        };

        self.balance -= amount;
        self.positions.insert(instrument_id.to_string(), position);
        let trade = Trade {
            id: self.ids.next_trade_id(),
            instrument_id: instrument_id.to_string(),
            side: TradeSide::Buy,
            quantity: units,
            price,
            total: amount,
            timestamp: now,
        };
        self.record(trade.clone());
        Ok(trade)
    }

    /// Sell `units` of `instrument_id` at `price`.
    ///
    /// A request within [`QUANTITY_EPSILON`] of the whole position sells
    /// exactly the whole position, and the entry is removed.
    pub fn sell(
        &mut self,
        instrument_id: &str,
        units: f64,
        price: f64,
        now: Timestamp,
    ) -> Result<Trade, TradeError> {
        let requested = validate_amount(units)?;
        let price = validate_amount(price)?;
        let owned = self.quantity(instrument_id);
        if owned <= QUANTITY_EPSILON || requested > owned + QUANTITY_EPSILON {
            return Err(TradeError::InsufficientHoldings {
                instrument_id: instrument_id.to_string(),
                requested,
                owned,
            });
        }

        let units = if requested >= owned - QUANTITY_EPSILON {
            owned
        } else {
            requested
        };
        let proceeds = units * price;
        let remaining = owned - units;

        self.balance += proceeds;
        if remaining <= QUANTITY_EPSILON {
            self.positions.remove(instrument_id);
        } else if let Some(position) = self.positions.get_mut(instrument_id) {
            position.quantity = remaining;
        }

        let trade = Trade {
            id: self.ids.next_trade_id(),
            instrument_id: instrument_id.to_string(),
            side: TradeSide::Sell,
            quantity: units,
            price,
            total: proceeds,
            timestamp: now,
        };
        self.record(trade.clone());
        Ok(trade)
    }

    /// Credit clicker earnings to the shared balance. Returns the new balance.
    pub fn deposit(&mut self, amount: f64) -> Result<f64, TradeError> {
        let amount = validate_amount(amount)?;
        self.balance += amount;
        Ok(self.balance)
    }

    fn record(&mut self, trade: Trade) {
        self.history.push_front(trade);
        self.history.truncate(self.history_cap);
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, instrument_id: &str) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    /// Owned units, zero when no position exists.
    pub fn quantity(&self, instrument_id: &str) -> f64 {
        self.positions.get(instrument_id).map_or(0.0, |p| p.quantity)
    }

    pub fn owns(&self, instrument_id: &str) -> bool {
        self.positions.contains_key(instrument_id)
    }

    /// Most-recent-first.
    pub fn history(&self) -> impl Iterator<Item = &Trade> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    pub fn next_trade_id(&self) -> u64 {
        self.ids.peek()
    }

    /// Market value of all positions. Instruments missing from `prices` are
    /// valued at their average cost.
    pub fn position_value(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .iter()
            .map(|(id, pos)| {
                let price = prices.get(id).copied().unwrap_or(pos.average_cost);
                pos.market_value(price)
            })
            .sum()
    }

    /// Paper gain on the position in `instrument_id` at `price`. `None` if
    /// nothing is owned.
    pub fn unrealized_pnl(&self, instrument_id: &str, price: f64) -> Option<f64> {
        self.positions
            .get(instrument_id)
            .map(|pos| pos.unrealized_pnl(price))
    }

    /// Balance plus the market value of every position.
    pub fn net_worth(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.balance + self.position_value(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(balance: f64) -> PortfolioLedger {
        PortfolioLedger::new(balance, 50)
    }

    #[test]
    fn average_cost_is_volume_weighted() {
        let mut l = ledger(1_000.0);
        // 10 units at 2, then 10 units at 4.
        l.buy("pizza", 20.0, 2.0, 0).unwrap();
        l.buy("pizza", 40.0, 4.0, 1).unwrap();

        let pos = l.position("pizza").unwrap();
        assert!((pos.quantity - 20.0).abs() < 1e-12);
        assert!((pos.average_cost - 3.0).abs() < 1e-12);
        assert!((l.balance() - 940.0).abs() < 1e-12);
    }

    #[test]
    fn buy_records_trade_with_currency_total() {
        let mut l = ledger(100.0);
        let trade = l.buy("pizza", 25.4, 2.54, 1_000).unwrap();
        assert_eq!(trade.side, TradeSide::Buy);
        assert!((trade.quantity - 10.0).abs() < 1e-12);
        assert_eq!(trade.total, 25.4);
        assert_eq!(trade.price, 2.54);
        assert_eq!(trade.timestamp, 1_000);
        assert_eq!(l.history().next(), Some(&trade));
    }

    #[test]
    fn buying_entire_balance_is_allowed() {
        let mut l = ledger(50.0);
        l.buy("pizza", 50.0, 2.0, 0).unwrap();
        assert_eq!(l.balance(), 0.0);
    }

    #[test]
    fn rejected_buy_changes_nothing() {
        let mut l = ledger(10.0);
        l.buy("pizza", 4.0, 2.0, 0).unwrap();
        let before = l.clone();

        let err = l.buy("pizza", 100.0, 2.0, 1).unwrap_err();
        assert_eq!(
            err,
            TradeError::InsufficientFunds {
                required: 100.0,
                available: 6.0
            }
        );
        assert_eq!(l, before);
    }

    #[test]
    fn dust_buy_is_rejected() {
        let mut l = ledger(10.0);
        let before = l.clone();
        assert_eq!(
            l.buy("pizza", 1e-10, 2.54, 0),
            Err(TradeError::InvalidAmount(1e-10))
        );
        assert!(!l.owns("pizza"));
        assert_eq!(l, before);
    }

    #[test]
    fn selling_everything_removes_position() {
        let mut l = ledger(100.0);
        l.buy("pizza", 20.0, 2.0, 0).unwrap();
        let trade = l.sell("pizza", 10.0, 3.0, 1).unwrap();

        assert_eq!(trade.total, 30.0);
        assert!(!l.owns("pizza"));
        assert!(l.position("pizza").is_none());
        assert!(!l.positions().contains_key("pizza"));
        assert!((l.balance() - 110.0).abs() < 1e-12);
    }

    #[test]
    fn partial_sell_keeps_average_cost() {
        let mut l = ledger(100.0);
        l.buy("pizza", 20.0, 2.0, 0).unwrap();
        l.sell("pizza", 4.0, 5.0, 1).unwrap();
        let pos = l.position("pizza").unwrap();
        assert!((pos.quantity - 6.0).abs() < 1e-12);
        assert!((pos.average_cost - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sell_within_tolerance_closes_position() {
        let mut l = ledger(100.0);
        l.buy("pizza", 10.0, 3.0, 0).unwrap();
        let owned = l.quantity("pizza");
        let trade = l.sell("pizza", owned + 1e-12, 3.0, 1).unwrap();
        assert_eq!(trade.quantity, owned);
        assert!(!l.owns("pizza"));
    }

    #[test]
    fn overselling_is_rejected() {
        let mut l = ledger(100.0);
        l.buy("pizza", 20.0, 2.0, 0).unwrap();
        let before = l.clone();
        assert!(matches!(
            l.sell("pizza", 11.0, 2.0, 1),
            Err(TradeError::InsufficientHoldings { .. })
        ));
        assert!(matches!(
            l.sell("taco", 1.0, 2.0, 1),
            Err(TradeError::InsufficientHoldings { owned, .. }) if owned == 0.0
        ));
        assert_eq!(l, before);
    }

    #[test]
    fn invalid_amounts_are_rejected() {
        let mut l = ledger(100.0);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(l.buy("pizza", bad, 2.0, 0), Err(TradeError::InvalidAmount(_))));
            assert!(matches!(l.sell("pizza", bad, 2.0, 0), Err(TradeError::InvalidAmount(_))));
            assert!(matches!(l.deposit(bad), Err(TradeError::InvalidAmount(_))));
        }
        assert_eq!(l.balance(), 100.0);
        assert_eq!(l.history_len(), 0);
    }

    #[test]
    fn history_is_bounded_most_recent_first() {
        let mut l = PortfolioLedger::new(1_000_000.0, 50);
        for i in 0..60 {
            l.buy("pizza", 1.0, 2.0, i).unwrap();
        }
        assert_eq!(l.history_len(), 50);
        let stamps: Vec<i64> = l.history().map(|t| t.timestamp).collect();
        let expected: Vec<i64> = (10..60).rev().collect();
        assert_eq!(stamps, expected);
        assert_eq!(l.next_trade_id(), 61);
    }

    #[test]
    fn deposit_credits_balance() {
        let mut l = ledger(10.0);
        assert_eq!(l.deposit(5.0).unwrap(), 15.0);
    }

    #[test]
    fn net_worth_marks_positions_to_market() {
        let mut l = ledger(100.0);
        l.buy("pizza", 20.0, 2.0, 0).unwrap();
        let prices = BTreeMap::from([("pizza".to_string(), 3.0)]);
        assert!((l.position_value(&prices) - 30.0).abs() < 1e-12);
        assert!((l.net_worth(&prices) - 110.0).abs() < 1e-12);
        // Missing price falls back to average cost.
        assert!((l.net_worth(&BTreeMap::new()) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn from_parts_resumes_ids_and_truncates_history() {
        let mut source = PortfolioLedger::new(1_000.0, 5);
        for i in 0..5 {
            source.buy("pizza", 1.0, 1.0, i).unwrap();
        }
        let history: Vec<Trade> = source.history().cloned().collect();
        let mut restored = PortfolioLedger::from_parts(
            source.balance(),
            source.positions().clone(),
            history,
            3,
            source.next_trade_id(),
        );
        assert_eq!(restored.history_len(), 3);
        let trade = restored.buy("pizza", 1.0, 1.0, 10).unwrap();
        assert_eq!(trade.id.0, 6);
    }

    #[test]
    fn unrealized_pnl_only_for_owned() {
        let mut l = ledger(100.0);
        l.buy("pizza", 20.0, 2.0, 0).unwrap();
        assert_eq!(l.unrealized_pnl("pizza", 3.0), Some(10.0));
        assert_eq!(l.unrealized_pnl("taco", 3.0), None);
    }
}
