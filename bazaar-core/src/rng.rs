//! Deterministic RNG hierarchy.
//!
//! A master seed is expanded into named sub-seeds (`"market"`, `"restore"`)
//! via BLAKE3, so a seeded engine replays the same price path regardless of
//! how it was constructed, and a restored engine gets a fresh but
//! reproducible stream derived from its save point.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// A hierarchy for an unseeded engine: the master seed comes from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy().next_u64())
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a `(stream, iteration)` pair.
    ///
    /// Independent of derivation order.
    pub fn sub_seed(&self, stream: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn rng_for(&self, stream: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stream, iteration))
    }
}
