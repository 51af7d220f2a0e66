//! Market worker thread, the one owner of a live `MarketEngine`.
//!
//! The UI side holds a [`MarketHandle`] and talks to the worker over an
//! `mpsc` channel. Each request that needs an answer carries its own reply
//! channel. The worker waits on the command channel with a timeout equal to
//! the time left until the next tick, so one loop drives both commands and
//! the price schedule.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bazaar_core::domain::{Timestamp, Trade, TradeSide};
use bazaar_core::{MarketEngine, MarketEvent, MarketSnapshot, PersistedState, TradeError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum MarketCommand {
    /// Run one tick now, outside the regular schedule. Replies with the
    /// tick's timestamp.
    Tick {
        reply: Sender<Timestamp>,
    },
    SubmitTrade {
        side: TradeSide,
        instrument_id: String,
        amount: f64,
        reply: Sender<Result<Trade, TradeError>>,
    },
    SellAll {
        instrument_id: String,
        reply: Sender<Result<Trade, TradeError>>,
    },
    Deposit {
        amount: f64,
        reply: Sender<Result<f64, TradeError>>,
    },
    Reset,
    Snapshot {
        reply: Sender<MarketSnapshot>,
    },
    DrainEvents {
        reply: Sender<Vec<MarketEvent>>,
    },
    SaveState {
        reply: Sender<PersistedState>,
    },
    Shutdown,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("market worker is not running")]
    Disconnected,

    #[error(transparent)]
    Trade(#[from] TradeError),
}

/// How the worker schedules ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSchedule {
    /// Tick every interval.
    Every(Duration),
    /// Only tick on [`MarketCommand::Tick`].
    Manual,
}

/// Client side of a running worker. Dropping it shuts the worker down.
pub struct MarketHandle {
    tx: Sender<MarketCommand>,
    join: Option<JoinHandle<MarketEngine>>,
}

/// Move `engine` onto a new worker thread.
pub fn spawn_market<C: Clock>(
    engine: MarketEngine,
    clock: C,
    schedule: TickSchedule,
) -> std::io::Result<MarketHandle> {
    let (tx, rx) = mpsc::channel();
    let join = thread::Builder::new()
        .name("bazaar-market".into())
        .spawn(move || worker_loop(engine, clock, schedule, rx))?;
    Ok(MarketHandle {
        tx,
        join: Some(join),
    })
}

fn worker_loop<C: Clock>(
    mut engine: MarketEngine,
    clock: C,
    schedule: TickSchedule,
    rx: Receiver<MarketCommand>,
) -> MarketEngine {
    info!(?schedule, "market worker started");
    let interval = match schedule {
        TickSchedule::Every(interval) => Some(interval),
        TickSchedule::Manual => None,
    };
    let mut next_tick = Instant::now();

    loop {
        let received = match interval {
            Some(interval) => {
                let now = Instant::now();
                if now >= next_tick {
                    engine.tick(clock.now_ms());
                    next_tick += interval;
                    // Fell more than one interval behind: skip ahead rather
                    // than burst-tick.
                    if next_tick < now {
                        next_tick = now + interval;
                    }
                    continue;
                }
                rx.recv_timeout(next_tick - now)
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(MarketCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(cmd) => handle_command(&mut engine, &clock, cmd),
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    info!(ticks = engine.ticks_processed(), "market worker stopped");
    engine
}

fn handle_command<C: Clock>(engine: &mut MarketEngine, clock: &C, cmd: MarketCommand) {
    match cmd {
        MarketCommand::Tick { reply } => {
            let now = clock.now_ms();
            engine.tick(now);
            let _ = reply.send(now);
        }
        MarketCommand::SubmitTrade {
            side,
            instrument_id,
            amount,
            reply,
        } => {
            let result = engine.submit_trade(side, &instrument_id, amount, clock.now_ms());
            if let Err(err) = &result {
                warn!(instrument = %instrument_id, %side, amount, %err, "trade rejected");
            }
            let _ = reply.send(result);
        }
        MarketCommand::SellAll {
            instrument_id,
            reply,
        } => {
            let result = engine.sell_all(&instrument_id, clock.now_ms());
            if let Err(err) = &result {
                warn!(instrument = %instrument_id, %err, "sell-all rejected");
            }
            let _ = reply.send(result);
        }
        MarketCommand::Deposit { amount, reply } => {
            let result = engine.deposit(amount);
            if let Err(err) = &result {
                warn!(amount, %err, "deposit rejected");
            }
            let _ = reply.send(result);
        }
        MarketCommand::Reset => engine.reset(),
        MarketCommand::Snapshot { reply } => {
            let _ = reply.send(engine.snapshot());
        }
        MarketCommand::DrainEvents { reply } => {
            let _ = reply.send(engine.drain_events());
        }
        MarketCommand::SaveState { reply } => {
            let _ = reply.send(engine.save_state());
        }
        MarketCommand::Shutdown => {} // handled in loop
    }
}

impl MarketHandle {
    fn send(&self, cmd: MarketCommand) -> Result<(), WorkerError> {
        self.tx.send(cmd).map_err(|_| WorkerError::Disconnected)
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> MarketCommand) -> Result<T, WorkerError> {
        let (reply, rx) = mpsc::channel();
        self.send(build(reply))?;
        rx.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Tick once and wait for it. Returns the tick's timestamp.
    pub fn tick(&self) -> Result<Timestamp, WorkerError> {
        self.request(|reply| MarketCommand::Tick { reply })
    }

    pub fn submit_trade(
        &self,
        side: TradeSide,
        instrument_id: &str,
        amount: f64,
    ) -> Result<Trade, WorkerError> {
        let instrument_id = instrument_id.to_string();
        let trade = self.request(|reply| MarketCommand::SubmitTrade {
            side,
            instrument_id,
            amount,
            reply,
        })??;
        debug!(id = %trade.id, "trade confirmed");
        Ok(trade)
    }

    pub fn buy(&self, instrument_id: &str, currency_amount: f64) -> Result<Trade, WorkerError> {
        self.submit_trade(TradeSide::Buy, instrument_id, currency_amount)
    }

    pub fn sell(&self, instrument_id: &str, units: f64) -> Result<Trade, WorkerError> {
        self.submit_trade(TradeSide::Sell, instrument_id, units)
    }

    pub fn sell_all(&self, instrument_id: &str) -> Result<Trade, WorkerError> {
        let instrument_id = instrument_id.to_string();
        Ok(self.request(|reply| MarketCommand::SellAll {
            instrument_id,
            reply,
        })??)
    }

    pub fn deposit(&self, amount: f64) -> Result<f64, WorkerError> {
        Ok(self.request(|reply| MarketCommand::Deposit { amount, reply })??)
    }

    pub fn reset(&self) -> Result<(), WorkerError> {
        self.send(MarketCommand::Reset)
    }

    pub fn snapshot(&self) -> Result<MarketSnapshot, WorkerError> {
        self.request(|reply| MarketCommand::Snapshot { reply })
    }

    pub fn drain_events(&self) -> Result<Vec<MarketEvent>, WorkerError> {
        self.request(|reply| MarketCommand::DrainEvents { reply })
    }

    pub fn save_state(&self) -> Result<PersistedState, WorkerError> {
        self.request(|reply| MarketCommand::SaveState { reply })
    }

    /// Stop the worker and take the engine back.
    pub fn shutdown(mut self) -> Result<MarketEngine, WorkerError> {
        let _ = self.tx.send(MarketCommand::Shutdown);
        let join = self.join.take().ok_or(WorkerError::Disconnected)?;
        join.join().map_err(|_| WorkerError::Disconnected)
    }
}

impl Drop for MarketHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.tx.send(MarketCommand::Shutdown);
            let _ = join.join();
        }
    }
}

impl std::fmt::Debug for MarketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketHandle")
            .field("running", &self.join.is_some())
            .finish()
    }
}
