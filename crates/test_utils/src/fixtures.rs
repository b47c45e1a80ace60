//! Pre-built Test Fixtures
//!
//! Ready-to-use instants and catalog setups shared across suites.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;

/// Instants used across suites
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The pinned epoch all fixed clocks start at
    pub fn epoch() -> DateTime<Utc> {
        static EPOCH: Lazy<DateTime<Utc>> =
            Lazy::new(|| Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        *EPOCH
    }
}

/// External user ids used across suites
pub struct UserFixtures;

impl UserFixtures {
    pub fn alice() -> &'static str {
        "user-alice"
    }

    pub fn bob() -> &'static str {
        "user-bob"
    }
}
