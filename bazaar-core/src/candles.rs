//! Candle aggregation: folds a tick stream into fixed-width OHLC windows.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Timestamp};

/// What a tick did to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleUpdate {
    Opened,
    Extended,
}

/// Bounded, insertion-ordered candle history for one instrument.
///
/// A tick opens a new candle when the series is empty or when at least
/// `duration_ms` has passed since the last candle opened (a tick exactly on
/// the boundary opens a new one). Otherwise it extends the last candle. On
/// overflow the oldest candle is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    duration_ms: i64,
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    pub fn new(duration_ms: u64, capacity: usize) -> Self {
        Self {
            duration_ms: i64::try_from(duration_ms).unwrap_or(i64::MAX),
            capacity: capacity.max(1),
            candles: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Rebuild a series from persisted candles, keeping only the newest
    /// `capacity` of them.
    pub fn from_candles(duration_ms: u64, capacity: usize, candles: Vec<Candle>) -> Self {
        let mut series = Self::new(duration_ms, capacity);
        let skip = candles.len().saturating_sub(series.capacity);
        series.candles.extend(candles.into_iter().skip(skip));
        series
    }

    pub fn on_price_tick(&mut self, price: f64, now: Timestamp) -> CandleUpdate {
        if let Some(last) = self.candles.back_mut() {
            if now - last.timestamp < self.duration_ms {
                last.absorb(price);
                return CandleUpdate::Extended;
            }
        }
        while self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(Candle::opened_at(now, price));
        CandleUpdate::Opened
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Oldest-first copy.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }
}
