//! Ledger entry types
//!
//! A `FiniteTransaction` is immutable once written; the triple
//! (product, user, reference) is unique and serves as the idempotency key
//! for retried external callbacks. A `PlannedTransaction` is a mutable
//! pending debit that only ever feeds the available-balance computation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{PlannedTransactionId, ProductId, TransactionId, UserId};

/// An immutable, uniquely-keyed record of one balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiniteTransaction {
    /// Unique identifier (time-ordered)
    pub id: TransactionId,
    /// The user whose balance changed
    pub user: UserId,
    /// The product the change settles
    pub product: ProductId,
    /// Signed amount: positive credits, negative debits
    pub amount: Decimal,
    /// Caller-supplied idempotency reference
    pub reference: String,
    /// Transaction timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for writing a new ledger entry; the store assigns the identifier
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user: UserId,
    pub product: ProductId,
    pub amount: Decimal,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// A pending debit, excluded from the immutable ledger
///
/// Planned transactions reduce the available balance until they are settled
/// (converted into a finite transaction) or voided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTransaction {
    /// Unique identifier
    pub id: PlannedTransactionId,
    /// The user whose available balance is reduced
    pub user: UserId,
    /// The product the debit will settle against
    pub product: ProductId,
    /// Positive amount held back from the available balance
    pub amount: Decimal,
    /// Reference the eventual settlement will carry
    pub reference: String,
    /// When the debit was planned
    pub created_at: DateTime<Utc>,
}
