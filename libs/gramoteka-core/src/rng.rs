//! Injectable randomness for processors.
//!
//! Task construction is shot through with sampling decisions (composition
//! weights, display shuffles, distractor picks). Processors never touch a
//! thread-local generator; they draw a fresh `StdRng` from the source they
//! were built with, so tests can pin the whole construction path to a seed.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Source of per-operation random generators.
pub trait RngSource: Send + Sync {
    fn rng(&self) -> StdRng;
}

/// Production source: a fresh OS-entropy-seeded generator per operation.
#[derive(Debug, Default)]
pub struct OsSeeded;

impl RngSource for OsSeeded {
    fn rng(&self) -> StdRng {
        StdRng::from_entropy()
    }
}

/// Deterministic source for tests: every operation starts from the same seed.
#[derive(Debug)]
pub struct FixedSeed(pub u64);

impl RngSource for FixedSeed {
    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }
}

/// Pick one value from a discrete distribution with relative weights.
/// `values` and `weights` must be non-empty and of equal length.
pub fn weighted_pick<T: Copy>(rng: &mut StdRng, values: &[T], weights: &[u32]) -> T {
    debug_assert_eq!(values.len(), weights.len());
    match WeightedIndex::new(weights) {
        Ok(dist) => values[dist.sample(rng)],
        Err(_) => values[0],
    }
}
