//! Market engine. Owns every piece of simulation state and is the only
//! surface the UI talks to.
//!
//! One `tick(now)` runs the whole schedule in a fixed order:
//!
//! 1. Expire bull runs with `now > end_time`
//! 2. If the spawn check is due, maybe start a bull run
//! 3. Step every instrument's price
//! 4. Fold the new prices into the candle series
//!
//! Trades read the current price and mutate the ledger inside the same
//! `&mut self` call, so no tick can land between "price shown" and "price
//! executed".

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::candles::{CandleSeries, CandleUpdate};
use crate::config::{ConfigError, MarketConfig};
use crate::domain::{Instrument, Position, Timestamp, Trade, TradeSide};
use crate::events::MarketEvent;
use crate::ledger::{PortfolioLedger, TradeError};
use crate::persistence::{PersistedState, StateError, SCHEMA_VERSION};
use crate::price_model::{PriceMove, RandomWalk};
use crate::rng::RngHierarchy;
use crate::snapshot::MarketSnapshot;
use crate::volatility::{VolatilityScheduler, VolatilityState};

const MARKET_STREAM: &str = "market";
const RESTORE_STREAM: &str = "restore";

pub struct MarketEngine {
    config: MarketConfig,
    /// Keyed by id; iteration order fixes the per-tick draw order.
    instruments: BTreeMap<String, Instrument>,
    walk: RandomWalk,
    prices: BTreeMap<String, f64>,
    moves: BTreeMap<String, PriceMove>,
    candles: BTreeMap<String, CandleSeries>,
    volatility: VolatilityScheduler,
    ledger: PortfolioLedger,
    rng_tree: RngHierarchy,
    rng: StdRng,
    events: Vec<MarketEvent>,
    last_tick: Option<Timestamp>,
    ticks_processed: u64,
}

impl MarketEngine {
    /// Build an engine in its initial state. Fails if `config` is invalid.
    pub fn new(config: MarketConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng_tree = match config.seed {
            Some(seed) => RngHierarchy::new(seed),
            None => RngHierarchy::from_entropy(),
        };
        let rng = rng_tree.rng_for(MARKET_STREAM, 0);
        let instruments: BTreeMap<String, Instrument> = config
            .instruments
            .iter()
            .map(|i| (i.id.clone(), i.clone()))
            .collect();
        let c = &config.constants;

        let mut engine = Self {
            walk: RandomWalk::from_constants(c),
            volatility: VolatilityScheduler::new(instruments.keys().cloned(), c),
            ledger: PortfolioLedger::new(config.initial_balance, c.trade_history_cap),
            prices: BTreeMap::new(),
            moves: BTreeMap::new(),
            candles: BTreeMap::new(),
            instruments,
            rng_tree,
            rng,
            events: Vec::new(),
            last_tick: None,
            ticks_processed: 0,
            config,
        };
        engine.seed_instrument_state();
        Ok(engine)
    }

    fn seed_instrument_state(&mut self) {
        let c = &self.config.constants;
        self.prices = self
            .instruments
            .values()
            .map(|i| (i.id.clone(), i.base_price))
            .collect();
        self.moves = self
            .instruments
            .keys()
            .map(|id| (id.clone(), PriceMove::Flat))
            .collect();
        self.candles = self
            .instruments
            .keys()
            .map(|id| (id.clone(), CandleSeries::new(c.candle_duration_ms, c.max_candles)))
            .collect();
    }

    // ─── Commands ────────────────────────────────────────────────────

    /// Advance the simulation to `now`.
    pub fn tick(&mut self, now: Timestamp) {
        for instrument_id in self.volatility.expire(now) {
            let final_price = self.prices.get(&instrument_id).copied().unwrap_or_default();
            info!(instrument = %instrument_id, final_price, "bull run ended");
            self.events.push(MarketEvent::VolatilityEnded {
                instrument_id,
                final_price,
            });
        }

        if self.volatility.check_due(now) {
            if let Some((instrument_id, period)) =
                self.volatility.maybe_spawn(now, &self.prices, &mut self.rng)
            {
                info!(
                    instrument = %instrument_id,
                    start_price = period.start_price,
                    end_time = period.end_time,
                    "bull run started"
                );
                self.events.push(MarketEvent::VolatilityStarted {
                    instrument_id,
                    start_price: period.start_price,
                    end_time: period.end_time,
                    multiplier: period.multiplier,
                });
            }
        }

        for (id, instrument) in &self.instruments {
            let Some(price) = self.prices.get_mut(id) else {
                continue;
            };
            let previous = *price;
            let next = self
                .walk
                .step(instrument, previous, self.volatility.period(id), &mut self.rng);
            *price = next;
            self.moves.insert(id.clone(), PriceMove::between(previous, next));

            if let Some(series) = self.candles.get_mut(id) {
                if series.on_price_tick(next, now) == CandleUpdate::Opened {
                    debug!(instrument = %id, open = next, timestamp = now, "candle opened");
                }
            }
        }

        self.last_tick = Some(now);
        self.ticks_processed += 1;
    }

    /// Execute a trade at the current price.
    ///
    /// For [`TradeSide::Buy`] `amount` is currency to spend; for
    /// [`TradeSide::Sell`] it is units to sell.
    pub fn submit_trade(
        &mut self,
        side: TradeSide,
        instrument_id: &str,
        amount: f64,
        now: Timestamp,
    ) -> Result<Trade, TradeError> {
        let price = self
            .prices
            .get(instrument_id)
            .copied()
            .ok_or_else(|| TradeError::UnknownInstrument(instrument_id.to_string()))?;

        let trade = match side {
            TradeSide::Buy => self.ledger.buy(instrument_id, amount, price, now)?,
            TradeSide::Sell => self.ledger.sell(instrument_id, amount, price, now)?,
        };
        debug!(
            id = %trade.id,
            instrument = %trade.instrument_id,
            side = %trade.side,
            quantity = trade.quantity,
            price = trade.price,
            total = trade.total,
            "trade executed"
        );
        self.events.push(MarketEvent::TradeExecuted(trade.clone()));
        Ok(trade)
    }

    /// Sell the whole position in `instrument_id`.
    pub fn sell_all(&mut self, instrument_id: &str, now: Timestamp) -> Result<Trade, TradeError> {
        if !self.instruments.contains_key(instrument_id) {
            return Err(TradeError::UnknownInstrument(instrument_id.to_string()));
        }
        let owned = self.ledger.quantity(instrument_id);
        if owned <= 0.0 {
            return Err(TradeError::InsufficientHoldings {
                instrument_id: instrument_id.to_string(),
                requested: 0.0,
                owned,
            });
        }
        self.submit_trade(TradeSide::Sell, instrument_id, owned, now)
    }

    /// Credit clicker earnings to the shared balance.
    pub fn deposit(&mut self, amount: f64) -> Result<f64, TradeError> {
        let balance = self.ledger.deposit(amount)?;
        self.events.push(MarketEvent::Deposited { amount, balance });
        Ok(balance)
    }

    /// Reinitialize everything from configuration: base prices, no candles,
    /// no positions, empty history, initial balance, no bull runs, RNG back
    /// to the start of the seeded stream.
    pub fn reset(&mut self) {
        self.seed_instrument_state();
        self.volatility.clear();
        self.ledger = PortfolioLedger::new(
            self.config.initial_balance,
            self.config.constants.trade_history_cap,
        );
        self.rng = self.rng_tree.rng_for(MARKET_STREAM, 0);
        self.last_tick = None;
        self.ticks_processed = 0;
        self.events.clear();
        self.events.push(MarketEvent::Reset);
        info!(instruments = self.instruments.len(), "market reset");
    }

    /// Take every queued notification, oldest first.
    pub fn drain_events(&mut self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── Queries ─────────────────────────────────────────────────────

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            prices: self.prices.clone(),
            price_moves: self.moves.clone(),
            candles: self
                .candles
                .iter()
                .map(|(id, series)| (id.clone(), series.to_vec()))
                .collect(),
            positions: self.ledger.positions().clone(),
            balance: self.ledger.balance(),
            trade_history: self.ledger.history().cloned().collect(),
            active_volatility_periods: self.volatility.active_periods().clone(),
            net_worth: self.ledger.net_worth(&self.prices),
            last_tick: self.last_tick,
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn instrument(&self, instrument_id: &str) -> Option<&Instrument> {
        self.instruments.get(instrument_id)
    }

    pub fn price(&self, instrument_id: &str) -> Option<f64> {
        self.prices.get(instrument_id).copied()
    }

    pub fn candles(&self, instrument_id: &str) -> Option<&CandleSeries> {
        self.candles.get(instrument_id)
    }

    pub fn volatility_state(&self, instrument_id: &str) -> VolatilityState {
        self.volatility.state(instrument_id)
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn balance(&self) -> f64 {
        self.ledger.balance()
    }

    pub fn last_tick(&self) -> Option<Timestamp> {
        self.last_tick
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed
    }

    // ─── Persistence ─────────────────────────────────────────────────

    pub fn save_state(&self) -> PersistedState {
        let positions = self.ledger.positions();
        PersistedState {
            schema_version: SCHEMA_VERSION,
            saved_at: None,
            prices: self.prices.clone(),
            candles: self
                .candles
                .iter()
                .map(|(id, series)| (id.clone(), series.to_vec()))
                .collect(),
            positions: positions
                .iter()
                .map(|(id, p)| (id.clone(), p.quantity))
                .collect(),
            average_costs: positions
                .iter()
                .map(|(id, p)| (id.clone(), p.average_cost))
                .collect(),
            trade_history: self.ledger.history().cloned().collect(),
            balance: self.ledger.balance(),
            active_volatility_periods: self.volatility.active_periods().clone(),
            next_trade_id: self.ledger.next_trade_id(),
            last_volatility_check: self.volatility.last_check(),
            last_tick: self.last_tick,
            ticks_processed: self.ticks_processed,
        }
    }

    /// Rebuild an engine from `config` plus a persisted state.
    ///
    /// Instruments the state does not mention start fresh at their base
    /// price. The RNG is reseeded from the save point, so two restores of
    /// the same document with the same seed replay identically.
    pub fn restore(config: MarketConfig, state: PersistedState) -> Result<Self, StateError> {
        state.validate_against(&config)?;
        let mut engine = Self::new(config)?;
        let c = engine.config.constants.clone();

        for (id, price) in state.prices {
            engine.prices.insert(id, price);
        }
        for (id, candles) in state.candles {
            engine.candles.insert(
                id,
                CandleSeries::from_candles(c.candle_duration_ms, c.max_candles, candles),
            );
        }

        let positions: BTreeMap<String, Position> = state
            .positions
            .iter()
            .filter_map(|(id, &quantity)| {
                let average_cost = state.average_costs.get(id)?;
                Some((id.clone(), Position::new(quantity, *average_cost)))
            })
            .collect();
        engine.ledger = PortfolioLedger::from_parts(
            state.balance,
            positions,
            state.trade_history,
            c.trade_history_cap,
            state.next_trade_id,
        );
        engine
            .volatility
            .restore(state.active_volatility_periods, state.last_volatility_check);

        engine.last_tick = state.last_tick;
        engine.ticks_processed = state.ticks_processed;
        engine.rng = engine
            .rng_tree
            .rng_for(RESTORE_STREAM, state.ticks_processed);

        info!(
            ticks_processed = engine.ticks_processed,
            positions = engine.ledger.positions().len(),
            balance = engine.ledger.balance(),
            "market restored"
        );
        Ok(engine)
    }
}

impl std::fmt::Debug for MarketEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketEngine")
            .field("instruments", &self.instruments.len())
            .field("balance", &self.ledger.balance())
            .field("last_tick", &self.last_tick)
            .field("ticks_processed", &self.ticks_processed)
            .field("master_seed", &self.rng_tree.master_seed())
            .finish()
    }
}
