//! Crash point sampling

use crate::BASE_MULTIPLIER;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Source of crash points, one sample per round
pub trait CrashPointSampler: Send + 'static {
    /// Sample a crash point in `[1.00, max)`
    fn sample(&mut self, max: f64) -> f64;
}

/// Uniform sampler over `[1.00, max)`
pub struct UniformSampler {
    rng: StdRng,
}

impl UniformSampler {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence, for replays and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl CrashPointSampler for UniformSampler {
    fn sample(&mut self, max: f64) -> f64 {
        if max <= BASE_MULTIPLIER {
            return BASE_MULTIPLIER;
        }
        self.rng.gen_range(BASE_MULTIPLIER..max)
    }
}

/// Replays a fixed list of crash points, cycling when exhausted
pub struct FixedSampler {
    points: Vec<f64>,
    next: usize,
}

impl FixedSampler {
    pub fn new(points: Vec<f64>) -> Self {
        Self { points, next: 0 }
    }
}

impl CrashPointSampler for FixedSampler {
    fn sample(&mut self, max: f64) -> f64 {
        let Some(&point) = self.points.get(self.next % self.points.len().max(1)) else {
            return BASE_MULTIPLIER;
        };
        self.next += 1;
        if point >= max {
            return largest_below(max);
        }
        point.max(BASE_MULTIPLIER)
    }
}

/// Largest `f64` strictly below `max`, never under 1.00
fn largest_below(max: f64) -> f64 {
    if !(max.is_finite() && max > BASE_MULTIPLIER) {
        return BASE_MULTIPLIER;
    }
    f64::from_bits(max.to_bits() - 1)
}
