use super::Timestamp;
use serde::{Deserialize, Serialize};

/// An active bull run on one instrument.
///
/// `start_price` is captured when the period starts and anchors the
/// max-gain cap for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityPeriod {
    pub end_time: Timestamp,
    pub multiplier: f64,
    pub start_price: f64,
}

impl VolatilityPeriod {
    /// Expired strictly after `end_time`; a tick at exactly `end_time` is
    /// still inside the period.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.end_time
    }

    /// Highest price the instrument may reach during this period.
    pub fn price_cap(&self, max_gain_factor: f64) -> f64 {
        self.start_price * max_gain_factor
    }

    pub fn remaining_ms(&self, now: Timestamp) -> i64 {
        (self.end_time - now).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strict() {
        let p = VolatilityPeriod {
            end_time: 5_000,
            multiplier: 3.0,
            start_price: 2.0,
        };
        assert!(!p.is_expired(4_999));
        assert!(!p.is_expired(5_000));
        assert!(p.is_expired(5_001));
        assert_eq!(p.remaining_ms(4_000), 1_000);
        assert_eq!(p.remaining_ms(6_000), 0);
    }

    #[test]
    fn cap_scales_start_price() {
        let p = VolatilityPeriod {
            end_time: 0,
            multiplier: 3.0,
            start_price: 2.0,
        };
        assert_eq!(p.price_cap(5.0), 10.0);
    }
}
