//! Seeded RNG for rank-level ordering.
//!
//! Objects sharing a rank have no ordering guarantee.  Shuffling them at
//! setup time keeps models from silently depending on creation order, and
//! seeding the shuffle keeps a given run reproducible.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Kernel-level RNG.  Used only on the driver thread.
pub struct ShuffleRng(SmallRng);

impl ShuffleRng {
    pub fn new(seed: u64) -> Self {
        ShuffleRng(SmallRng::seed_from_u64(seed))
    }

    /// Derive an independent RNG, e.g. one per pass, deterministically from
    /// this one.
    pub fn child(&mut self, offset: u64) -> ShuffleRng {
        let child_seed: u64 = self.0.r#gen::<u64>() ^ offset.wrapping_mul(MIXING_CONSTANT);
        ShuffleRng(SmallRng::seed_from_u64(child_seed))
    }

    /// Shuffle a slice in place (Fisher-Yates).
    #[inline]
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.0);
    }
}
