//! Bazaar Core — the trading mini-game's market simulation.
//!
//! - Domain types (instruments, candles, positions, trades, bull-run periods)
//! - Random-walk price model with event-amplified volatility
//! - Bull-run scheduler with a max-gain cap
//! - Fixed-window OHLC candle aggregation
//! - Portfolio ledger with volume-weighted average cost
//! - `MarketEngine`, which runs all of the above on one tick schedule
//!
//! Nothing here reads a clock or spawns a thread. Callers pass timestamps in.

pub mod candles;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod persistence;
pub mod price_model;
pub mod rng;
pub mod snapshot;
pub mod volatility;

pub use config::{ConfigError, EngineConstants, MarketConfig};
pub use engine::MarketEngine;
pub use events::MarketEvent;
pub use ledger::TradeError;
pub use persistence::{PersistedState, StateError};
pub use snapshot::MarketSnapshot;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner moves across its worker
    /// thread boundary is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Instrument>();
        require_sync::<domain::Instrument>();
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::VolatilityPeriod>();
        require_sync::<domain::VolatilityPeriod>();
        require_send::<domain::TradeId>();
        require_sync::<domain::TradeId>();

        // Engine and its parts
        require_send::<MarketEngine>();
        require_sync::<MarketEngine>();
        require_send::<candles::CandleSeries>();
        require_sync::<candles::CandleSeries>();
        require_send::<ledger::PortfolioLedger>();
        require_sync::<ledger::PortfolioLedger>();
        require_send::<volatility::VolatilityScheduler>();
        require_sync::<volatility::VolatilityScheduler>();
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();

        // Everything that crosses a channel
        require_send::<MarketSnapshot>();
        require_sync::<MarketSnapshot>();
        require_send::<MarketEvent>();
        require_sync::<MarketEvent>();
        require_send::<PersistedState>();
        require_sync::<PersistedState>();
        require_send::<MarketConfig>();
        require_sync::<MarketConfig>();
        require_send::<TradeError>();
        require_sync::<TradeError>();
        require_send::<StateError>();
        require_sync::<StateError>();
    }
}
