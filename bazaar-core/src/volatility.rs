//! Bull-run scheduler.
//!
//! Per instrument the state is either `Inactive` or `Active(period)`. At most
//! one instrument is active across the whole market. Expiry runs on every
//! tick; spawning runs on the coarser `volatility_check_ms` cadence.

use std::collections::BTreeMap;

use rand::Rng;

use crate::config::EngineConstants;
use crate::domain::{Timestamp, VolatilityPeriod};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolatilityState {
    Inactive,
    Active(VolatilityPeriod),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityScheduler {
    /// Sorted, so a seeded pick is reproducible.
    instrument_ids: Vec<String>,
    active: BTreeMap<String, VolatilityPeriod>,
    last_check: Option<Timestamp>,
    check_interval_ms: i64,
    duration_ms: i64,
    multiplier: f64,
    spawn_probability: f64,
}

impl VolatilityScheduler {
    pub fn new<I, S>(instrument_ids: I, constants: &EngineConstants) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut instrument_ids: Vec<String> = instrument_ids.into_iter().map(Into::into).collect();
        instrument_ids.sort();
        instrument_ids.dedup();
        Self {
            instrument_ids,
            active: BTreeMap::new(),
            last_check: None,
            check_interval_ms: i64::try_from(constants.volatility_check_ms).unwrap_or(i64::MAX),
            duration_ms: i64::try_from(constants.volatility_duration_ms).unwrap_or(i64::MAX),
            multiplier: constants.volatility_period_multiplier,
            spawn_probability: constants.spawn_probability,
        }
    }

    pub fn state(&self, instrument_id: &str) -> VolatilityState {
        match self.active.get(instrument_id) {
            Some(period) => VolatilityState::Active(*period),
            None => VolatilityState::Inactive,
        }
    }

    pub fn period(&self, instrument_id: &str) -> Option<&VolatilityPeriod> {
        self.active.get(instrument_id)
    }

    pub fn active_periods(&self) -> &BTreeMap<String, VolatilityPeriod> {
        &self.active
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn last_check(&self) -> Option<Timestamp> {
        self.last_check
    }

    /// End every period with `now > end_time`. Returns the ids that ended.
    pub fn expire(&mut self, now: Timestamp) -> Vec<String> {
        let ended: Vec<String> = self
            .active
            .iter()
            .filter(|(_, period)| period.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ended {
            self.active.remove(id);
        }
        ended
    }

    /// Whether a spawn check is due at `now`.
    ///
    /// The first check after construction (or [`clear`](Self::clear)) is due
    /// immediately.
    pub fn check_due(&self, now: Timestamp) -> bool {
        match self.last_check {
            None => true,
            Some(last) => now - last >= self.check_interval_ms,
        }
    }

    /// Run one spawn check. Records `now` as the last check time.
    ///
    /// Does nothing while any instrument is active. Otherwise a draw against
    /// `spawn_probability` decides whether to start a bull run on one
    /// inactive instrument, picked uniformly. `prices` supplies the start
    /// price that anchors the max-gain cap.
    pub fn maybe_spawn<R: Rng + ?Sized>(
        &mut self,
        now: Timestamp,
        prices: &BTreeMap<String, f64>,
        rng: &mut R,
    ) -> Option<(String, VolatilityPeriod)> {
        self.last_check = Some(now);
        if self.has_active() || !rng.gen_bool(self.spawn_probability) {
            return None;
        }

        let candidates: Vec<&String> = self
            .instrument_ids
            .iter()
            .filter(|id| !self.active.contains_key(*id) && prices.contains_key(*id))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let id = candidates[rng.gen_range(0..candidates.len())].clone();
        let period = VolatilityPeriod {
            end_time: now + self.duration_ms,
            multiplier: self.multiplier,
            start_price: prices[&id],
        };
        self.active.insert(id.clone(), period);
        Some((id, period))
    }

    /// Reinstate a persisted period (save/load). Ignores unknown instruments.
    pub fn restore(
        &mut self,
        periods: BTreeMap<String, VolatilityPeriod>,
        last_check: Option<Timestamp>,
    ) {
        self.active = periods
            .into_iter()
            .filter(|(id, _)| self.instrument_ids.binary_search(id).is_ok())
            .collect();
        self.last_check = last_check;
    }

    /// Back to all-inactive with no check history.
    pub fn clear(&mut self) {
        self.active.clear();
        self.last_check = None;
    }
}
