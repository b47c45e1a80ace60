//! User accounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::UserId;

/// A user's balance row
///
/// Users are created lazily on first reference and never deleted. `seq` is
/// the store-assigned internal ordinal; cross-user operations lock rows in
/// ascending `seq` order to avoid deadlocks under opposite-direction
/// transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Unique identifier
    pub id: UserId,
    /// Store-assigned internal ordinal, used for lock ordering
    pub seq: i64,
    /// External identifier (unique)
    pub external_id: String,
    /// Current balance in credits; always Σ of the user's finite transactions
    pub balance: Decimal,
    /// First-reference timestamp
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Available balance given the user's pending planned debits
    pub fn available(&self, planned_total: Decimal) -> Decimal {
        self.balance - planned_total
    }
}
