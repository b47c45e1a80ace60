//! Unit tests for the temporal rules
//!
//! The extension policy and the permanent threshold are the backbone of
//! ownership math, so they get exercised beyond the in-module tests.

use chrono::{Duration, TimeZone, Utc};
use core_kernel::temporal::{
    extended_expiry, is_effectively_permanent, RollingWindow, PERMANENT_OWNERSHIP_DAYS,
};
use proptest::prelude::*;

fn instant(offset_secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

#[test]
fn test_stacking_sequences() {
    let now = instant(0);

    // A chain of three one-hour grants on an unexpired row.
    let mut expiry = extended_expiry(None, now, Duration::hours(1));
    expiry = extended_expiry(Some(expiry), now, Duration::hours(1));
    expiry = extended_expiry(Some(expiry), now, Duration::hours(1));
    assert_eq!(expiry, now + Duration::hours(3));
}

#[test]
fn test_expired_grant_does_not_contribute() {
    let now = instant(0);
    let stale = instant(-86_400);
    let expiry = extended_expiry(Some(stale), now, Duration::hours(1));
    assert_eq!(expiry, now + Duration::hours(1));
}

#[test]
fn test_shrinking_below_now_is_allowed() {
    // A reversal may push the expiry into the past; the row simply lapses.
    let now = instant(0);
    let current = instant(600);
    let expiry = extended_expiry(Some(current), now, Duration::seconds(-3600));
    assert!(expiry < now);
}

#[test]
fn test_permanent_boundary() {
    let now = instant(0);
    let threshold = now + Duration::days(PERMANENT_OWNERSHIP_DAYS);
    assert!(!is_effectively_permanent(threshold, now));
    assert!(is_effectively_permanent(threshold + Duration::seconds(1), now));
}

#[test]
fn test_rolling_window_excludes_boundary_start() {
    let now = instant(0);
    let window = RollingWindow::from_secs(600);
    assert!(!window.contains(instant(-600), now));
    assert!(window.contains(instant(-599), now));
    assert!(window.contains(now, now));
}

proptest! {
    /// Extending by a positive duration never yields an expiry before `now`.
    #[test]
    fn prop_positive_extension_lands_in_the_future(
        current_offset in -10_000i64..10_000,
        grant_secs in 1i64..100_000,
    ) {
        let now = instant(0);
        let current = Some(instant(current_offset));
        let expiry = extended_expiry(current, now, Duration::seconds(grant_secs));
        prop_assert!(expiry > now);
    }

    /// Stacking order on unexpired grants does not matter.
    #[test]
    fn prop_extension_is_additive_while_unexpired(
        a in 1i64..10_000,
        b in 1i64..10_000,
    ) {
        let now = instant(0);
        let ab = extended_expiry(
            Some(extended_expiry(None, now, Duration::seconds(a))),
            now,
            Duration::seconds(b),
        );
        let ba = extended_expiry(
            Some(extended_expiry(None, now, Duration::seconds(b))),
            now,
            Duration::seconds(a),
        );
        prop_assert_eq!(ab, ba);
    }
}
