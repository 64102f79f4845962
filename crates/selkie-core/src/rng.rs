//! Deterministic randomness for seeding and jitter.
//!
//! Layout output must be a pure function of the input snapshot, so all jitter
//! is derived from node ids rather than wall-clock entropy.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

#[derive(Debug, Clone)]
pub struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Maps to [-1, 1] (exclusive).
    pub fn next_f64_signed(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        let v = (u as f64) / ((1u64 << 53) as f64);
        (v * 2.0) - 1.0
    }

    /// Maps to [0, 1) with 53 bits of precision.
    pub fn next_f64_unit(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        (u as f64) / ((1u64 << 53) as f64)
    }
}

/// Derives a stable, non-zero PRNG seed from a node id.
pub fn seed_for_id(id: &str) -> u64 {
    let mut hasher = FxHasher::default();
    id.hash(&mut hasher);
    hasher.finish().max(1)
}
