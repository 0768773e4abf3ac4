//! Reference number generation
//!
//! Format: `PREFIX-YYYY-MMDD-RRRR`, where the date comes from the
//! application's creation time (UTC) and `RRRR` is a random draw in
//! 1000..=9999. Uniqueness is enforced by the store's unique index, not here.

use chrono::{DateTime, Datelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};

/// Default prefix for reference numbers
pub const DEFAULT_REFERENCE_PREFIX: &str = "SBM";

#[derive(Debug, Clone)]
pub struct ReferenceGenerator {
    prefix: String,
    /// Shared by clones; `None` draws from the thread RNG
    seeded: Option<Arc<Mutex<StdRng>>>,
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            seeded: None,
        }
    }

    /// Draw suffixes from a seeded RNG so the sequence is reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeded = Some(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a reference for the given creation time
    pub fn generate(&self, created_at: DateTime<Utc>) -> String {
        match &self.seeded {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
                self.generate_with(created_at, &mut *rng)
            }
            None => self.generate_with(created_at, &mut rand::thread_rng()),
        }
    }

    /// Generate using a caller-supplied random source
    pub fn generate_with<R: Rng + ?Sized>(&self, created_at: DateTime<Utc>, rng: &mut R) -> String {
        let suffix: u16 = rng.gen_range(1000..=9999);
        format!(
            "{}-{:04}-{:02}{:02}-{}",
            self.prefix,
            created_at.year(),
            created_at.month(),
            created_at.day(),
            suffix
        )
    }
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_PREFIX)
    }
}
