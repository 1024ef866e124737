// White noise.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::waveform::{WaveParams, Waveform};

/// Uniform white noise in [-1, 1).
///
/// Each instance carries its own generator so simultaneous notes do
/// not correlate.
pub struct Noise {
    rng: SmallRng,
}

impl Noise {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Deterministic noise, for offline renders that must repeat.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl Waveform for Noise {
    #[inline]
    fn sample(&mut self, _phase: f64, _time: f64, _params: &WaveParams) -> f64 {
        self.rng.gen_range(-1.0..1.0)
    }
}
