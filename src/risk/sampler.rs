//! Random rejection sampling
//!
//! The sample must come from a source an adversary cannot predict, so every
//! draw uses a ChaCha generator freshly seeded from the operating system.

use rand::SeedableRng;
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::{OsRng, StdRng};
use tracing::warn;

const PER_MILLE: u32 = 1_000;

/// Decides whether an independent sample lands inside `per_mille / 1000`
pub trait RejectSampler: Send + Sync {
    fn hit(&self, per_mille: u32) -> bool;
}

/// Sampler backed by [`OsRng`]
///
/// Fails open: if the entropy source is unavailable no random rejection is
/// made and the warning is logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngSampler;

impl RejectSampler for OsRngSampler {
    fn hit(&self, per_mille: u32) -> bool {
        let Ok(reject) = Bernoulli::from_ratio(per_mille.min(PER_MILLE), PER_MILLE) else {
            return false;
        };
        // Seeding through from_rng surfaces entropy failure instead of panicking
        match StdRng::from_rng(OsRng) {
            Ok(mut rng) => reject.sample(&mut rng),
            Err(e) => {
                warn!(error = %e, "OS entropy source failed, skipping random reject");
                false
            }
        }
    }
}
