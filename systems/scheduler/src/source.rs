//! Per-unit randomness handed to every launched unit of work.

use std::sync::atomic::{AtomicU64, Ordering};

use ecosystem_core::EntityIdentity;
use ecosystem_system_lifecycle::{Chance, RandomChance};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Produces an independent [`Chance`] for each unit of work.
pub trait ChanceSource: Sync {
    /// Chance type moved into the unit's thread.
    type Chance: Chance + Send;

    /// Creates the chance used by the unit launched for `identity`.
    fn chance_for(&self, identity: EntityIdentity) -> Self::Chance;
}

/// Default source: one ChaCha stream per unit.
///
/// With a base seed, units draw from consecutive streams of that seed; without
/// one, each unit is seeded from the thread-local generator. Seeding fixes the
/// streams, not the order in which concurrent units take the grid lock.
#[derive(Debug, Default)]
pub struct EntropySource {
    seed: Option<u64>,
    issued: AtomicU64,
}

impl EntropySource {
    /// Source seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source deriving every unit's stream from `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            issued: AtomicU64::new(0),
        }
    }

    /// Source seeded from `seed` when present, from entropy otherwise.
    #[must_use]
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::seeded)
    }
}

impl ChanceSource for EntropySource {
    type Chance = RandomChance<ChaCha8Rng>;

    fn chance_for(&self, _identity: EntityIdentity) -> Self::Chance {
        let Some(seed) = self.seed else {
            return RandomChance::from_entropy();
        };
        let stream = self.issued.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        RandomChance::new(rng)
    }
}
