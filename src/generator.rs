//! Synthetic sensor source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Metric, SensorValues};

// ---

/// Draws one uniform value per metric from its documented range.
#[derive(Debug, Clone)]
pub struct SensorGenerator {
    rng: StdRng,
}

impl SensorGenerator {
    // ---
    pub fn from_entropy() -> Self {
        SensorGenerator {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator, used by tests and `walk --seed`.
    pub fn seeded(seed: u64) -> Self {
        SensorGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self) -> SensorValues {
        // ---
        let mut v = [0.0; 6];
        for (slot, metric) in v.iter_mut().zip(Metric::ALL) {
            let (low, high) = metric.range();
            *slot = round2(self.rng.gen_range(low..=high));
        }
        SensorValues::from_ordered(v)
    }
}

/// Round to two decimals. Range bounds are themselves two-decimal values, so
/// rounding never leaves the range.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
