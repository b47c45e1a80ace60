//! In-memory serializable store
//!
//! Backs the test suites and small deployments. State lives behind a single
//! async mutex; a transaction owns the guard plus a working copy of state,
//! so writers are strictly serial and rollback is simply dropping the copy.
//! Commit writes the working copy back through the held guard.
//!
//! Uniqueness of (product, user, reference) is enforced inside the
//! transaction against the working copy, producing the same
//! [`StoreError::DuplicateReference`] a relational unique index would.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{PlannedTransactionId, ProductId, TransactionId, UserId};

use crate::account::UserAccount;
use crate::entry::{FiniteTransaction, NewTransaction, PlannedTransaction};
use crate::ownership::{License, Ownership};
use crate::store::{LedgerStore, StoreError, TransferStats};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    user_seq: i64,
    users: HashMap<UserId, UserAccount>,
    users_by_external: HashMap<String, UserId>,
    transactions: Vec<FiniteTransaction>,
    references: HashSet<(ProductId, UserId, String)>,
    planned: HashMap<PlannedTransactionId, PlannedTransaction>,
    ownerships: HashMap<(UserId, ProductId), Ownership>,
    licenses: HashMap<(UserId, ProductId, String), License>,
    trials: HashMap<(UserId, ProductId), DateTime<Utc>>,
}

/// Open transaction: the held guard serializes writers; `work` accumulates
/// the transaction's changes until commit.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

/// In-memory implementation of the ledger storage port
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        let MemoryTx { mut guard, work } = tx;
        *guard = work;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        drop(tx);
        Ok(())
    }

    async fn user_for_update(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError> {
        if let Some(id) = tx.work.users_by_external.get(external_id) {
            return Ok(tx.work.users[id].clone());
        }
        tx.work.user_seq += 1;
        let account = UserAccount {
            id: UserId::new(),
            seq: tx.work.user_seq,
            external_id: external_id.to_string(),
            balance: Decimal::ZERO,
            created_at: now,
        };
        tx.work
            .users_by_external
            .insert(external_id.to_string(), account.id);
        tx.work.users.insert(account.id, account.clone());
        Ok(account)
    }

    async fn user_pair_for_update(
        &self,
        tx: &mut Self::Tx,
        first_external: &str,
        second_external: &str,
        now: DateTime<Utc>,
    ) -> Result<(UserAccount, UserAccount), StoreError> {
        // The global mutex already serializes writers; creating in argument
        // order is safe here. Relational stores must order by `seq`.
        let first = self.user_for_update(tx, first_external, now).await?;
        let second = self.user_for_update(tx, second_external, now).await?;
        Ok((first, second))
    }

    async fn find_user(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        Ok(tx
            .work
            .users_by_external
            .get(external_id)
            .and_then(|id| tx.work.users.get(id))
            .cloned())
    }

    async fn apply_balance(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let account = tx
            .work
            .users
            .get_mut(&user)
            .ok_or_else(|| StoreError::RowNotFound(format!("user {user}")))?;
        account.balance += delta;
        Ok(account.balance)
    }

    async fn insert_transaction(
        &self,
        tx: &mut Self::Tx,
        new: NewTransaction,
    ) -> Result<FiniteTransaction, StoreError> {
        let key = (new.product, new.user, new.reference.clone());
        if tx.work.references.contains(&key) {
            return Err(StoreError::DuplicateReference {
                product: new.product,
                user: new.user,
                reference: new.reference,
            });
        }
        tx.work.references.insert(key);
        let record = FiniteTransaction {
            id: TransactionId::new_v7(),
            user: new.user,
            product: new.product,
            amount: new.amount,
            reference: new.reference,
            created_at: new.created_at,
        };
        tx.work.transactions.push(record.clone());
        Ok(record)
    }

    async fn transaction_by_id(
        &self,
        tx: &mut Self::Tx,
        id: TransactionId,
    ) -> Result<Option<FiniteTransaction>, StoreError> {
        Ok(tx.work.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn transactions_for_user(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Vec<FiniteTransaction>, StoreError> {
        Ok(tx
            .work
            .transactions
            .iter()
            .filter(|t| t.user == user)
            .cloned()
            .collect())
    }

    async fn planned_total(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Decimal, StoreError> {
        Ok(tx
            .work
            .planned
            .values()
            .filter(|p| p.user == user)
            .map(|p| p.amount)
            .sum())
    }

    async fn insert_planned(
        &self,
        tx: &mut Self::Tx,
        planned: PlannedTransaction,
    ) -> Result<(), StoreError> {
        tx.work.planned.insert(planned.id, planned);
        Ok(())
    }

    async fn remove_planned(
        &self,
        tx: &mut Self::Tx,
        id: PlannedTransactionId,
    ) -> Result<PlannedTransaction, StoreError> {
        tx.work
            .planned
            .remove(&id)
            .ok_or_else(|| StoreError::RowNotFound(format!("planned transaction {id}")))
    }

    async fn ownership(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
    ) -> Result<Option<Ownership>, StoreError> {
        Ok(tx.work.ownerships.get(&(user, product)).cloned())
    }

    async fn put_ownership(&self, tx: &mut Self::Tx, row: Ownership) -> Result<(), StoreError> {
        tx.work.ownerships.insert((row.user, row.product), row);
        Ok(())
    }

    async fn ownerships_for_user(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Vec<Ownership>, StoreError> {
        Ok(tx
            .work
            .ownerships
            .values()
            .filter(|o| o.user == user)
            .cloned()
            .collect())
    }

    async fn license(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
        target_id: &str,
    ) -> Result<Option<License>, StoreError> {
        Ok(tx
            .work
            .licenses
            .get(&(user, product, target_id.to_string()))
            .cloned())
    }

    async fn put_license(&self, tx: &mut Self::Tx, row: License) -> Result<(), StoreError> {
        tx.work
            .licenses
            .insert((row.user, row.product, row.target_id.clone()), row);
        Ok(())
    }

    async fn transfer_stats(
        &self,
        tx: &mut Self::Tx,
        transfer_product: ProductId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<TransferStats, StoreError> {
        let mut stats = TransferStats::default();
        for t in tx
            .work
            .transactions
            .iter()
            .filter(|t| t.product == transfer_product && t.user == user && t.created_at > since)
        {
            if t.amount.is_sign_negative() {
                stats.sent_count += 1;
            } else {
                stats.received_count += 1;
                stats.received_volume += t.amount;
            }
        }
        Ok(stats)
    }

    async fn try_mark_trial(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if tx.work.trials.contains_key(&(user, product)) {
            return Ok(false);
        }
        tx.work.trials.insert((user, product), now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        store.user_for_update(&mut tx, "u1", now()).await.unwrap();
        store.rollback(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(store.find_user(&mut tx, "u1").await.unwrap().is_none());
        store.rollback(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists_changes() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let user = store.user_for_update(&mut tx, "u1", now()).await.unwrap();
        store.apply_balance(&mut tx, user.id, dec!(10)).await.unwrap();
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = store.find_user(&mut tx, "u1").await.unwrap().unwrap();
        assert_eq!(found.balance, dec!(10));
        store.rollback(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected_in_same_tx() {
        let store = MemoryStore::new();
        let product = ProductId::new();

        let mut tx = store.begin().await.unwrap();
        let user = store.user_for_update(&mut tx, "u1", now()).await.unwrap();
        let new = NewTransaction {
            user: user.id,
            product,
            amount: dec!(5),
            reference: "ref".into(),
            created_at: now(),
        };
        store.insert_transaction(&mut tx, new.clone()).await.unwrap();
        let err = store.insert_transaction(&mut tx, new).await;
        assert!(matches!(err, Err(StoreError::DuplicateReference { .. })));
        store.rollback(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_trial_mark_is_one_shot() {
        let store = MemoryStore::new();
        let product = ProductId::new();

        let mut tx = store.begin().await.unwrap();
        let user = store.user_for_update(&mut tx, "u1", now()).await.unwrap();
        assert!(store.try_mark_trial(&mut tx, user.id, product, now()).await.unwrap());
        assert!(!store.try_mark_trial(&mut tx, user.id, product, now()).await.unwrap());
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!store.try_mark_trial(&mut tx, user.id, product, now()).await.unwrap());
        store.rollback(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_user_seq_is_monotonic() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = store.user_for_update(&mut tx, "a", now()).await.unwrap();
        let b = store.user_for_update(&mut tx, "b", now()).await.unwrap();
        assert!(b.seq > a.seq);
        store.commit(tx).await.unwrap();
    }
}
