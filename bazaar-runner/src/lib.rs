//! Bazaar Runner — hosting for the market engine.
//!
//! This crate builds on `bazaar-core` to provide:
//! - Clock abstraction (system time or hand-driven)
//! - A worker thread that owns a live engine, driven over a command channel
//! - Headless simulation sessions with scheduled orders
//! - Save files and config loading
//! - CSV export of candles and trades

pub mod clock;
pub mod config;
pub mod export;
pub mod save;
pub mod session;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{default_config_toml, load_config};
pub use export::{export_candles_csv, export_trades_csv, write_csv};
pub use save::{load_state, restore_engine, save_engine, write_state};
pub use session::{run_session, ScheduledOrder, SessionPlan, SessionReport};
pub use worker::{spawn_market, MarketCommand, MarketHandle, TickSchedule, WorkerError};
