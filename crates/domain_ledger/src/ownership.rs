//! Ownership and license rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{LicenseId, ProductId, UserId};

/// A (user, product) expiry row
///
/// One row per pair, extended in place. The user owns the product while
/// `expires_at` lies in the future.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub user: UserId,
    pub product: ProductId,
    pub expires_at: DateTime<Utc>,
}

impl Ownership {
    /// Returns true if the grant is unexpired at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Ownership scoped by an external target (per-item licensing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub user: UserId,
    pub product: ProductId,
    /// Arbitrary external scope, e.g. the licensed item's id
    pub target_id: String,
    pub expires_at: DateTime<Utc>,
}

impl License {
    /// Returns true if the license is unexpired at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
