//! Random-walk price model.
//!
//! Each tick moves the price by a uniform fraction of itself. Outside a bull
//! run the move is symmetric; inside one it only goes up, and the result is
//! capped at `start_price × max_gain_factor`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::EngineConstants;
use crate::domain::{Instrument, VolatilityPeriod};

/// Floor for every simulated price.
pub const PRICE_EPSILON: f64 = 0.001;

/// Direction of the last tick, used by the UI to flash a price cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceMove {
    Up,
    Down,
    #[default]
    Flat,
}

impl PriceMove {
    pub fn between(previous: f64, next: f64) -> Self {
        if next > previous {
            PriceMove::Up
        } else if next < previous {
            PriceMove::Down
        } else {
            PriceMove::Flat
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalk {
    /// Global scale on every instrument's volatility.
    pub volatility_multiplier: f64,
    pub max_gain_factor: f64,
}

impl RandomWalk {
    pub fn from_constants(constants: &EngineConstants) -> Self {
        Self {
            volatility_multiplier: constants.volatility_multiplier,
            max_gain_factor: constants.max_gain_factor,
        }
    }

    pub fn effective_volatility(
        &self,
        instrument: &Instrument,
        period: Option<&VolatilityPeriod>,
    ) -> f64 {
        let amplification = period.map_or(1.0, |p| p.multiplier);
        instrument.volatility * self.volatility_multiplier * amplification
    }

    /// Next price for `instrument`, consuming exactly one draw from `rng`.
    pub fn step<R: Rng + ?Sized>(
        &self,
        instrument: &Instrument,
        current_price: f64,
        period: Option<&VolatilityPeriod>,
        rng: &mut R,
    ) -> f64 {
        let draw = match period {
            Some(_) => rng.gen::<f64>(),
            None => rng.gen_range(-1.0..=1.0),
        };
        self.apply(instrument, current_price, period, draw)
    }

    /// Deterministic half of [`step`](Self::step): apply an already drawn
    /// uniform value (`[0, 1)` in a bull run, `[-1, 1]` otherwise).
    pub fn apply(
        &self,
        instrument: &Instrument,
        current_price: f64,
        period: Option<&VolatilityPeriod>,
        draw: f64,
    ) -> f64 {
        let delta = draw * self.effective_volatility(instrument, period) * current_price;
        let mut next = current_price + delta;
        if !next.is_finite() {
            next = PRICE_EPSILON;
        }
        next = next.max(PRICE_EPSILON);

        if let Some(period) = period {
            next = next.min(period.price_cap(self.max_gain_factor)).max(PRICE_EPSILON);
        }
        next
    }
}
