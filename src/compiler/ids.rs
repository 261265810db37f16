//! Generated identifiers for derived actions, simple actions and tree templates

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DERIVED_ACTION_PREFIX: &str = "derivedAction";
pub const SIMPLE_ACTION_PREFIX: &str = "simpleAction";

/// Mints random 128-bit tokens rendered as 32 lowercase hex digits
#[derive(Debug, Clone)]
pub struct IdGenerator {
    rng: StdRng,
}

impl IdGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence, for tests and diff-friendly builds
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_token(&mut self) -> String {
        format!("{:032x}", self.rng.gen::<u128>())
    }

    pub fn mint(&mut self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_token())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
