//! Seedable random number generator.
//!
//! With [`Config::rng_seed`](crate::Config::rng_seed) set, retransmission
//! jitter, server cookies and `Random` values become reproducible.

use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// A random number generator that can be seeded for deterministic behavior.
///
/// Without a seed it defers to the thread-local generator.
pub struct SeededRng {
    inner: Option<StdRng>,
}

impl SeededRng {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            inner: seed.map(StdRng::seed_from_u64),
        }
    }

    /// Generate a random value of type T.
    pub fn gen<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        match self.inner.as_mut() {
            Some(rng) => rng.gen(),
            None => rand::thread_rng().gen(),
        }
    }

    /// Fill `dest` with random bytes.
    pub fn fill(&mut self, dest: &mut [u8]) {
        match self.inner.as_mut() {
            Some(rng) => rng.fill_bytes(dest),
            None => rand::thread_rng().fill_bytes(dest),
        }
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededRng")
            .field("seeded", &self.inner.is_some())
            .finish()
    }
}
