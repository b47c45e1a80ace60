//! Unit-of-work storage port
//!
//! The ledger never touches storage directly: every operation runs against
//! this port, inside one transaction value obtained from [`LedgerStore::begin`]
//! and finished by exactly one `commit` or `rollback` at the outermost call.
//! Nested settlement steps receive the open `Tx` as `&mut`, the explicit
//! replacement for ambient transaction state.
//!
//! Implementations must provide SERIALIZABLE semantics: two concurrent
//! transactions inserting the same (product, user, reference) must resolve
//! into one success and one [`StoreError::DuplicateReference`], and
//! read-then-write races must surface as [`StoreError::Serialization`],
//! which callers treat as transient and retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{PlannedTransactionId, ProductId, TransactionId, UserId};

use crate::account::UserAccount;
use crate::entry::{FiniteTransaction, NewTransaction, PlannedTransaction};
use crate::ownership::{License, Ownership};

/// Errors surfaced by storage implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The (product, user, reference) triple already exists
    #[error("Duplicate reference {reference} for product {product} and user {user}")]
    DuplicateReference {
        product: ProductId,
        user: UserId,
        reference: String,
    },

    /// Serialization conflict; transient, retry the whole unit of work
    #[error("Serialization conflict, retry")]
    Serialization,

    /// A row the operation relies on is missing
    #[error("Row not found: {0}")]
    RowNotFound(String),

    /// The backend is unreachable or failed
    #[error("Storage connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Returns true if retrying the unit of work may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Serialization)
    }
}

/// Rolling-window transfer statistics for one user
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferStats {
    /// Transfers sent inside the window
    pub sent_count: u32,
    /// Transfers received inside the window
    pub received_count: u32,
    /// Total credits received inside the window
    pub received_volume: Decimal,
}

/// Transactional storage behind the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Open transaction value; finished by `commit` or `rollback`
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;

    /// Loads the user row by external id, creating it lazily, locked for
    /// update for the rest of the transaction.
    async fn user_for_update(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError>;

    /// Loads and locks two user rows, always acquiring in ascending internal
    /// (`seq`) order regardless of argument order. Returns them in argument
    /// order.
    async fn user_pair_for_update(
        &self,
        tx: &mut Self::Tx,
        first_external: &str,
        second_external: &str,
        now: DateTime<Utc>,
    ) -> Result<(UserAccount, UserAccount), StoreError>;

    /// Looks up a user without creating or locking
    async fn find_user(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
    ) -> Result<Option<UserAccount>, StoreError>;

    /// Applies a signed delta to a locked user's balance; returns the new balance
    async fn apply_balance(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError>;

    /// Appends a finite transaction; a duplicate (product, user, reference)
    /// maps to [`StoreError::DuplicateReference`].
    async fn insert_transaction(
        &self,
        tx: &mut Self::Tx,
        new: NewTransaction,
    ) -> Result<FiniteTransaction, StoreError>;

    async fn transaction_by_id(
        &self,
        tx: &mut Self::Tx,
        id: TransactionId,
    ) -> Result<Option<FiniteTransaction>, StoreError>;

    async fn transactions_for_user(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Vec<FiniteTransaction>, StoreError>;

    /// Sum of the user's pending planned debits
    async fn planned_total(&self, tx: &mut Self::Tx, user: UserId)
        -> Result<Decimal, StoreError>;

    async fn insert_planned(
        &self,
        tx: &mut Self::Tx,
        planned: PlannedTransaction,
    ) -> Result<(), StoreError>;

    /// Removes a planned debit (settled or voided); errors if missing
    async fn remove_planned(
        &self,
        tx: &mut Self::Tx,
        id: PlannedTransactionId,
    ) -> Result<PlannedTransaction, StoreError>;

    async fn ownership(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
    ) -> Result<Option<Ownership>, StoreError>;

    /// Inserts or replaces the (user, product) ownership row
    async fn put_ownership(&self, tx: &mut Self::Tx, row: Ownership) -> Result<(), StoreError>;

    async fn ownerships_for_user(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Vec<Ownership>, StoreError>;

    async fn license(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
        target_id: &str,
    ) -> Result<Option<License>, StoreError>;

    /// Inserts or replaces the (user, product, target) license row
    async fn put_license(&self, tx: &mut Self::Tx, row: License) -> Result<(), StoreError>;

    /// Transfer activity for `user` under `transfer_product` since `since`
    async fn transfer_stats(
        &self,
        tx: &mut Self::Tx,
        transfer_product: ProductId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<TransferStats, StoreError>;

    /// Marks the (user, product) trial as consumed. Returns false when the
    /// trial was already used, which is the replay no-op for duplicated
    /// lifecycle notifications.
    async fn try_mark_trial(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
