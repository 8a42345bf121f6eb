//! Seeded RNG wrapper for reproducible behavior.
//!
//! Provides a thread-safe, seeded random number generator for mock
//! controllers so that injected failures are deterministic in tests.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded RNG wrapper for reproducible random behavior
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Returns true with probability `rate` (clamped to 0.0..=1.0).
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.lock().gen::<f64>() < rate
    }

    /// Relative noise factor in `1.0 - amplitude .. 1.0 + amplitude`.
    pub fn noise(&self, amplitude: f64) -> f64 {
        if amplitude <= 0.0 {
            return 1.0;
        }
        1.0 + self.inner.lock().gen_range(-amplitude..amplitude)
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("inner", &"<Mutex<ChaCha8Rng>>")
            .finish()
    }
}
