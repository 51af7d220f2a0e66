//! Domain types for the market simulation.

pub mod candle;
pub mod ids;
pub mod instrument;
pub mod position;
pub mod trade;
pub mod volatility;

pub use candle::Candle;
pub use ids::{IdGen, TradeId};
pub use instrument::{Instrument, InstrumentError};
pub use position::Position;
pub use trade::{Trade, TradeSide};
pub use volatility::VolatilityPeriod;

/// Milliseconds since an arbitrary epoch chosen by the caller.
///
/// The engine never reads a wall clock; every time-dependent operation takes
/// the caller's notion of "now".
pub type Timestamp = i64;
