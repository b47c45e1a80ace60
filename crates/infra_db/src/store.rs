//! PostgreSQL ledger store
//!
//! Implements the [`LedgerStore`] unit-of-work port. Transactions run at
//! SERIALIZABLE isolation; SQLSTATE 40001 (serialization failure) maps to
//! the transient [`StoreError::Serialization`] and 23505 on the
//! transactions idempotency index to [`StoreError::DuplicateReference`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use core_kernel::{LicenseId, PlannedTransactionId, ProductId, TransactionId, UserId};
use domain_ledger::entry::{FiniteTransaction, NewTransaction, PlannedTransaction};
use domain_ledger::ownership::{License, Ownership};
use domain_ledger::store::{LedgerStore, StoreError, TransferStats};
use domain_ledger::UserAccount;

/// PostgreSQL implementation of the ledger storage port
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Creates a store over the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if let Some(code) = db.code() {
            // https://www.postgresql.org/docs/current/errcodes-appendix.html
            if code.as_ref() == "40001" {
                return StoreError::Serialization;
            }
        }
    }
    StoreError::Connection(error.to_string())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    seq: i64,
    external_id: String,
    balance: Decimal,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: UserId::from(row.id),
            seq: row.seq,
            external_id: row.external_id,
            balance: row.balance,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    amount: Decimal,
    reference: String,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for FiniteTransaction {
    fn from(row: TransactionRow) -> Self {
        FiniteTransaction {
            id: TransactionId::from(row.id),
            user: UserId::from(row.user_id),
            product: ProductId::from(row.product_id),
            amount: row.amount,
            reference: row.reference,
            created_at: row.created_at,
        }
    }
}

fn ownership_from_row(row: &PgRow) -> Result<Ownership, sqlx::Error> {
    Ok(Ownership {
        user: UserId::from(row.try_get::<Uuid, _>("user_id")?),
        product: ProductId::from(row.try_get::<Uuid, _>("product_id")?),
        expires_at: row.try_get("expires_at")?,
    })
}

const SELECT_USER_FOR_UPDATE: &str = "SELECT id, seq, external_id, balance, created_at \
     FROM users WHERE external_id = $1 FOR UPDATE";

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await.map_err(map_sqlx)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await.map_err(map_sqlx)
    }

    async fn user_for_update(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError> {
        if let Some(row) = sqlx::query_as::<_, UserRow>(SELECT_USER_FOR_UPDATE)
            .bind(external_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx)?
        {
            return Ok(row.into());
        }

        sqlx::query(
            "INSERT INTO users (id, external_id, balance, created_at) \
             VALUES ($1, $2, 0, $3) ON CONFLICT (external_id) DO NOTHING",
        )
        .bind(Uuid::from(UserId::new()))
        .bind(external_id)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;

        let row = sqlx::query_as::<_, UserRow>(SELECT_USER_FOR_UPDATE)
            .bind(external_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn user_pair_for_update(
        &self,
        tx: &mut Self::Tx,
        first_external: &str,
        second_external: &str,
        now: DateTime<Utc>,
    ) -> Result<(UserAccount, UserAccount), StoreError> {
        for external in [first_external, second_external] {
            sqlx::query(
                "INSERT INTO users (id, external_id, balance, created_at) \
                 VALUES ($1, $2, 0, $3) ON CONFLICT (external_id) DO NOTHING",
            )
            .bind(Uuid::from(UserId::new()))
            .bind(external)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        }

        // Lock both rows in ascending seq order, whatever the argument
        // order, so opposite-direction transfers cannot deadlock.
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, seq, external_id, balance, created_at \
             FROM users WHERE external_id = ANY($1) ORDER BY seq FOR UPDATE",
        )
        .bind(vec![first_external.to_string(), second_external.to_string()])
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx)?;

        let mut first = None;
        let mut second = None;
        for row in rows {
            let account = UserAccount::from(row);
            if account.external_id == first_external {
                first = Some(account);
            } else if account.external_id == second_external {
                second = Some(account);
            }
        }
        match (first, second) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(StoreError::RowNotFound(format!(
                "users {first_external}, {second_external}"
            ))),
        }
    }

    async fn find_user(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, seq, external_id, balance, created_at \
             FROM users WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(Into::into))
    }

    async fn apply_balance(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            "UPDATE users SET balance = balance + $2 WHERE id = $1 RETURNING balance",
        )
        .bind(Uuid::from(user))
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StoreError::RowNotFound(format!("user {user}")))?;
        row.try_get("balance").map_err(map_sqlx)
    }

    async fn insert_transaction(
        &self,
        tx: &mut Self::Tx,
        new: NewTransaction,
    ) -> Result<FiniteTransaction, StoreError> {
        let id = TransactionId::new_v7();
        let result = sqlx::query(
            "INSERT INTO transactions (id, user_id, product_id, amount, reference, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(new.user))
        .bind(Uuid::from(new.product))
        .bind(new.amount)
        .bind(&new.reference)
        .bind(new.created_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(FiniteTransaction {
                id,
                user: new.user,
                product: new.product,
                amount: new.amount,
                reference: new.reference,
                created_at: new.created_at,
            }),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateReference {
                product: new.product,
                user: new.user,
                reference: new.reference,
            }),
            Err(err) => Err(map_sqlx(err)),
        }
    }

    async fn transaction_by_id(
        &self,
        tx: &mut Self::Tx,
        id: TransactionId,
    ) -> Result<Option<FiniteTransaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, user_id, product_id, amount, reference, created_at \
             FROM transactions WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(Into::into))
    }

    async fn transactions_for_user(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Vec<FiniteTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, user_id, product_id, amount, reference, created_at \
             FROM transactions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(Uuid::from(user))
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn planned_total(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total \
             FROM planned_transactions WHERE user_id = $1",
        )
        .bind(Uuid::from(user))
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        row.try_get("total").map_err(map_sqlx)
    }

    async fn insert_planned(
        &self,
        tx: &mut Self::Tx,
        planned: PlannedTransaction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO planned_transactions (id, user_id, product_id, amount, reference, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::from(planned.id))
        .bind(Uuid::from(planned.user))
        .bind(Uuid::from(planned.product))
        .bind(planned.amount)
        .bind(&planned.reference)
        .bind(planned.created_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn remove_planned(
        &self,
        tx: &mut Self::Tx,
        id: PlannedTransactionId,
    ) -> Result<PlannedTransaction, StoreError> {
        let row = sqlx::query(
            "DELETE FROM planned_transactions WHERE id = $1 \
             RETURNING id, user_id, product_id, amount, reference, created_at",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StoreError::RowNotFound(format!("planned transaction {id}")))?;

        Ok(PlannedTransaction {
            id: PlannedTransactionId::from(row.try_get::<Uuid, _>("id").map_err(map_sqlx)?),
            user: UserId::from(row.try_get::<Uuid, _>("user_id").map_err(map_sqlx)?),
            product: ProductId::from(row.try_get::<Uuid, _>("product_id").map_err(map_sqlx)?),
            amount: row.try_get("amount").map_err(map_sqlx)?,
            reference: row.try_get("reference").map_err(map_sqlx)?,
            created_at: row.try_get("created_at").map_err(map_sqlx)?,
        })
    }

    async fn ownership(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
    ) -> Result<Option<Ownership>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, product_id, expires_at FROM ownerships \
             WHERE user_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(Uuid::from(user))
        .bind(Uuid::from(product))
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        row.map(|r| ownership_from_row(&r).map_err(map_sqlx)).transpose()
    }

    async fn put_ownership(&self, tx: &mut Self::Tx, row: Ownership) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ownerships (user_id, product_id, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(Uuid::from(row.user))
        .bind(Uuid::from(row.product))
        .bind(row.expires_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn ownerships_for_user(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> Result<Vec<Ownership>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, product_id, expires_at FROM ownerships WHERE user_id = $1",
        )
        .bind(Uuid::from(user))
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        rows.iter()
            .map(|r| ownership_from_row(r).map_err(map_sqlx))
            .collect()
    }

    async fn license(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
        target_id: &str,
    ) -> Result<Option<License>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, product_id, target_id, expires_at FROM licenses \
             WHERE user_id = $1 AND product_id = $2 AND target_id = $3 FOR UPDATE",
        )
        .bind(Uuid::from(user))
        .bind(Uuid::from(product))
        .bind(target_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| -> Result<License, StoreError> {
            Ok(License {
                id: LicenseId::from(r.try_get::<Uuid, _>("id").map_err(map_sqlx)?),
                user: UserId::from(r.try_get::<Uuid, _>("user_id").map_err(map_sqlx)?),
                product: ProductId::from(r.try_get::<Uuid, _>("product_id").map_err(map_sqlx)?),
                target_id: r.try_get("target_id").map_err(map_sqlx)?,
                expires_at: r.try_get("expires_at").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn put_license(&self, tx: &mut Self::Tx, row: License) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO licenses (id, user_id, product_id, target_id, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, product_id, target_id) \
             DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(Uuid::from(row.id))
        .bind(Uuid::from(row.user))
        .bind(Uuid::from(row.product))
        .bind(&row.target_id)
        .bind(row.expires_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn transfer_stats(
        &self,
        tx: &mut Self::Tx,
        transfer_product: ProductId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<TransferStats, StoreError> {
        let row = sqlx::query(
            "SELECT \
                 COUNT(*) FILTER (WHERE amount < 0) AS sent_count, \
                 COUNT(*) FILTER (WHERE amount >= 0) AS received_count, \
                 COALESCE(SUM(amount) FILTER (WHERE amount >= 0), 0) AS received_volume \
             FROM transactions \
             WHERE product_id = $1 AND user_id = $2 AND created_at > $3",
        )
        .bind(Uuid::from(transfer_product))
        .bind(Uuid::from(user))
        .bind(since)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx)?;

        Ok(TransferStats {
            sent_count: row.try_get::<i64, _>("sent_count").map_err(map_sqlx)? as u32,
            received_count: row.try_get::<i64, _>("received_count").map_err(map_sqlx)? as u32,
            received_volume: row.try_get("received_volume").map_err(map_sqlx)?,
        })
    }

    async fn try_mark_trial(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO trial_grants (user_id, product_id, consumed_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(Uuid::from(user))
        .bind(Uuid::from(product))
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }
}
