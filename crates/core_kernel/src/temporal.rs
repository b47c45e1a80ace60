//! Temporal rules for time-boxed ownership
//!
//! Ownership of a product is a single expiry instant per (user, product).
//! This module holds the extension policy applied whenever a purchase grants
//! more time, the effectively-permanent threshold, and the rolling window
//! used for transfer rate limiting.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ownership extending past this many days from now is treated as permanent
/// and cannot be extended further by a purchase.
pub const PERMANENT_OWNERSHIP_DAYS: i64 = 3000;

/// Computes the new expiry after granting `duration` of additional time.
///
/// Stacks on top of an unexpired grant, but never on top of an expired one:
/// an expiry in the past restarts from `now`. A missing row behaves like an
/// expired one.
///
/// # Arguments
///
/// * `current` - The current expiry, if an ownership row exists
/// * `now` - The transaction timestamp
/// * `duration` - The (possibly negative, for reversals) time being granted
pub fn extended_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration: Duration,
) -> DateTime<Utc> {
    match current {
        Some(expiry) if expiry > now => expiry + duration,
        _ => now + duration,
    }
}

/// Returns true if the expiry lies beyond the permanent-ownership threshold.
pub fn is_effectively_permanent(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry > now + Duration::days(PERMANENT_OWNERSHIP_DAYS)
}

/// A rolling time window ending at `now`, used for transfer limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindow {
    /// Window length in seconds
    pub length_secs: i64,
}

impl RollingWindow {
    /// Creates a window of the given length in seconds
    pub fn from_secs(length_secs: i64) -> Self {
        Self { length_secs }
    }

    /// Creates a window of the given length in hours
    pub fn from_hours(hours: i64) -> Self {
        Self {
            length_secs: hours * 3600,
        }
    }

    /// Returns the inclusive start of the window ending at `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.length_secs)
    }

    /// Returns true if `at` falls inside the window ending at `now`
    pub fn contains(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at > self.start(now) && at <= now
    }
}
