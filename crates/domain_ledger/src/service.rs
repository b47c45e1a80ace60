//! The ledger service
//!
//! All balance and ownership mutations funnel through this type. Each public
//! operation is one serializable unit of work: begin, mutate through the
//! store port, commit, with a bounded retry on serialization conflicts and
//! a full rollback on every error path. Nested steps (revert re-entering the
//! settlement routine, transfers writing two entries) share the open
//! transaction value; only the public operation commits.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use core_kernel::temporal::{extended_expiry, is_effectively_permanent};
use core_kernel::{Clock, LicenseId, PlannedTransactionId, ProductId, TransactionId};
use domain_catalog::{GroupDirectory, Product};
use domain_rules::{Adjustment, RuleEngine};

use crate::account::UserAccount;
use crate::config::LedgerConfig;
use crate::entry::{FiniteTransaction, NewTransaction, PlannedTransaction};
use crate::error::LedgerError;
use crate::event::{EventSink, LedgerEvent};
use crate::ownership::{License, Ownership};
use crate::store::LedgerStore;

/// The transactional ledger
pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    directory: Arc<GroupDirectory>,
    rules: Arc<RuleEngine>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S: LedgerStore> Ledger<S> {
    /// Creates a ledger over the given store and collaborators
    pub fn new(
        store: Arc<S>,
        directory: Arc<GroupDirectory>,
        rules: Arc<RuleEngine>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            directory,
            rules,
            events,
            clock,
            config,
        }
    }

    /// Returns the store shared with this ledger
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Returns the group directory shared with this ledger
    pub fn directory(&self) -> Arc<GroupDirectory> {
        Arc::clone(&self.directory)
    }

    /// Credits a top-up product onto a user's balance.
    ///
    /// The credited amount is the product's cost, unless `custom_amount` is
    /// non-zero, in which case it must be at least the cost.
    ///
    /// # Errors
    ///
    /// - `Validation` for non-top-up or disabled products, or a custom
    ///   amount below cost
    /// - `DuplicateTransaction` when the reference was already settled
    pub async fn credit_top_up(
        &self,
        top_up_product: ProductId,
        user_external: &str,
        reference: &str,
        custom_amount: Decimal,
    ) -> Result<FiniteTransaction, LedgerError> {
        let product = self.directory.product_by_id(top_up_product)?;
        if !product.is_top_up() {
            return Err(LedgerError::Validation(format!(
                "product {} is not a top-up",
                product.slug
            )));
        }
        if product.is_disabled() {
            return Err(LedgerError::Validation(format!(
                "product {} is disabled",
                product.slug
            )));
        }
        let amount = if custom_amount.is_zero() {
            product.cost
        } else {
            if custom_amount < product.cost {
                return Err(LedgerError::Validation(format!(
                    "custom amount {custom_amount} below product cost {}",
                    product.cost
                )));
            }
            custom_amount
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let outcome = async {
                let user = self.store.user_for_update(&mut tx, user_external, now).await?;
                self.charge(&mut tx, &user, &product, amount, reference, now)
                    .await
            }
            .await;

            match outcome {
                Ok(entry) => {
                    self.store.commit(tx).await?;
                    self.emit(&product, user_external, &entry, 0).await;
                    return Ok(entry);
                }
                Err(err) => {
                    let _ = self.store.rollback(tx).await;
                    if self.should_retry(&err, attempt) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Purchases a service product, charging the rule-adjusted price and
    /// extending ownership of every bundled product.
    pub async fn purchase_service(
        &self,
        product_slug: &str,
        user_external: &str,
        quantity: i64,
        reference: &str,
    ) -> Result<FiniteTransaction, LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::Validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        let product = self.directory.product_by_slug(product_slug)?;
        if product.is_disabled() {
            return Err(LedgerError::Validation(format!(
                "product {product_slug} is disabled"
            )));
        }
        if !product.is_service() {
            return Err(LedgerError::Validation(format!(
                "product {product_slug} is not a service"
            )));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store.begin().await?;
            let outcome = self
                .purchase_in_tx(&mut tx, &product, user_external, quantity, reference)
                .await;

            match outcome {
                Ok((entry, granted_secs)) => {
                    self.store.commit(tx).await?;
                    self.emit(&product, user_external, &entry, granted_secs).await;
                    return Ok(entry);
                }
                Err(err) => {
                    let _ = self.store.rollback(tx).await;
                    if self.should_retry(&err, attempt) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Reverses a previous settlement, crediting the money back and
    /// shrinking the linked ownership.
    ///
    /// The reversal count is `round(original_amount / product_cost)`; the
    /// settlement routine is re-entered with unit cost and unit duration
    /// negated (see [`Ledger::settle_service`] for the sign-flip contract).
    /// The derived reference `"revert transaction {id}"` makes a second
    /// revert of the same transaction a `DuplicateTransaction`.
    pub async fn revert(
        &self,
        user_external: &str,
        transaction_id: TransactionId,
    ) -> Result<FiniteTransaction, LedgerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store.begin().await?;
            let outcome = self
                .revert_in_tx(&mut tx, user_external, transaction_id)
                .await;

            match outcome {
                Ok((entry, granted_secs, product)) => {
                    self.store.commit(tx).await?;
                    self.emit(&product, user_external, &entry, granted_secs).await;
                    return Ok(entry);
                }
                Err(err) => {
                    let _ = self.store.rollback(tx).await;
                    if self.should_retry(&err, attempt) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Moves credits between two users under the transfer product.
    ///
    /// Writes two linked entries (debit then credit) in one transaction,
    /// after checking the sender's count limit and the receiver's count and
    /// volume limits against the same rolling window. Returns the debit
    /// entry.
    pub async fn transfer(
        &self,
        from_external: &str,
        to_external: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<FiniteTransaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }
        if from_external == to_external {
            return Err(LedgerError::Validation(
                "cannot transfer to yourself".to_string(),
            ));
        }
        let product = self
            .directory
            .product_by_slug(&self.config.transfer_product_slug)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store.begin().await?;
            let outcome = self
                .transfer_in_tx(&mut tx, &product, from_external, to_external, amount, reference)
                .await;

            match outcome {
                Ok((debit, credit)) => {
                    self.store.commit(tx).await?;
                    self.emit(&product, from_external, &debit, 0).await;
                    self.emit(&product, to_external, &credit, 0).await;
                    return Ok(debit);
                }
                Err(err) => {
                    let _ = self.store.rollback(tx).await;
                    if self.should_retry(&err, attempt) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Previews the rule-adjusted (cost, duration) of a product for a user.
    ///
    /// Read-only; the transaction is always rolled back.
    pub async fn adjust_for_user(
        &self,
        product_slug: &str,
        user_external: &str,
    ) -> Result<Adjustment, LedgerError> {
        let product = self.directory.product_by_slug(product_slug)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let owned = match self.store.find_user(&mut tx, user_external).await? {
                Some(user) => self.owned_groups(&mut tx, &user, now).await?,
                None => HashSet::new(),
            };
            let groups = self.directory.groups_for_product_id(product.id);
            Ok(self.rules.adjust(&product, &groups, &owned))
        }
        .await;
        let _ = self.store.rollback(tx).await;
        outcome
    }

    /// Plans a pending debit, reducing the user's available balance.
    pub async fn plan_debit(
        &self,
        user_external: &str,
        product_slug: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<PlannedTransaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "planned amount must be positive, got {amount}"
            )));
        }
        let product = self.directory.product_by_slug(product_slug)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let user = self.store.user_for_update(&mut tx, user_external, now).await?;
            let held = self.store.planned_total(&mut tx, user.id).await?;
            let available = user.available(held);
            if available < amount {
                return Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available,
                });
            }
            let planned = PlannedTransaction {
                id: PlannedTransactionId::new(),
                user: user.id,
                product: product.id,
                amount,
                reference: reference.to_string(),
                created_at: now,
            };
            self.store.insert_planned(&mut tx, planned.clone()).await?;
            Ok(planned)
        }
        .await;

        match outcome {
            Ok(planned) => {
                self.store.commit(tx).await?;
                Ok(planned)
            }
            Err(err) => {
                let _ = self.store.rollback(tx).await;
                Err(err)
            }
        }
    }

    /// Settles a planned debit into a finite transaction
    pub async fn settle_planned(
        &self,
        user_external: &str,
        planned_id: PlannedTransactionId,
    ) -> Result<FiniteTransaction, LedgerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let outcome = async {
                let user = self.store.user_for_update(&mut tx, user_external, now).await?;
                let planned = self.store.remove_planned(&mut tx, planned_id).await?;
                if planned.user != user.id {
                    return Err(LedgerError::NotFound(format!(
                        "planned transaction {planned_id} for user {user_external}"
                    )));
                }
                let product = self.directory.product_by_id(planned.product)?;
                let entry = self
                    .charge(&mut tx, &user, &product, -planned.amount, &planned.reference, now)
                    .await?;
                Ok((entry, product))
            }
            .await;

            match outcome {
                Ok((entry, product)) => {
                    self.store.commit(tx).await?;
                    self.emit(&product, user_external, &entry, 0).await;
                    return Ok(entry);
                }
                Err(err) => {
                    let _ = self.store.rollback(tx).await;
                    if self.should_retry(&err, attempt) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Voids a planned debit, releasing the held amount
    pub async fn void_planned(
        &self,
        user_external: &str,
        planned_id: PlannedTransactionId,
    ) -> Result<(), LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let user = self.store.user_for_update(&mut tx, user_external, now).await?;
            let planned = self.store.remove_planned(&mut tx, planned_id).await?;
            if planned.user != user.id {
                return Err(LedgerError::NotFound(format!(
                    "planned transaction {planned_id} for user {user_external}"
                )));
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => self.store.commit(tx).await.map_err(Into::into),
            Err(err) => {
                let _ = self.store.rollback(tx).await;
                Err(err)
            }
        }
    }

    /// Purchases a service scoped to an external target, extending a license
    /// row instead of account-wide ownership. No bundle propagation:
    /// licenses are per-item.
    pub async fn purchase_license(
        &self,
        product_slug: &str,
        user_external: &str,
        target_id: &str,
        quantity: i64,
        reference: &str,
    ) -> Result<FiniteTransaction, LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::Validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        if target_id.trim().is_empty() {
            return Err(LedgerError::Validation("target id is empty".to_string()));
        }
        let product = self.directory.product_by_slug(product_slug)?;
        if product.is_disabled() {
            return Err(LedgerError::Validation(format!(
                "product {product_slug} is disabled"
            )));
        }
        if !product.is_service() {
            return Err(LedgerError::Validation(format!(
                "product {product_slug} is not a service"
            )));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store.begin().await?;
            let outcome = self
                .license_in_tx(&mut tx, &product, user_external, target_id, quantity, reference)
                .await;

            match outcome {
                Ok((entry, granted_secs)) => {
                    self.store.commit(tx).await?;
                    self.emit(&product, user_external, &entry, granted_secs).await;
                    return Ok(entry);
                }
                Err(err) => {
                    let _ = self.store.rollback(tx).await;
                    if self.should_retry(&err, attempt) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // In-transaction steps. These take the open transaction value and never
    // commit or roll back themselves.
    // ------------------------------------------------------------------

    async fn purchase_in_tx(
        &self,
        tx: &mut S::Tx,
        product: &Product,
        user_external: &str,
        quantity: i64,
        reference: &str,
    ) -> Result<(FiniteTransaction, i64), LedgerError> {
        let now = self.clock.now();
        let user = self.store.user_for_update(tx, user_external, now).await?;

        let owned = self.owned_groups(tx, &user, now).await?;
        let groups = self.directory.groups_for_product_id(product.id);
        let adjustment = self.rules.adjust(product, &groups, &owned);
        if adjustment.blocked {
            return Err(LedgerError::Validation(format!(
                "purchase of {} blocked by rule",
                product.slug
            )));
        }
        debug!(
            product = %product.slug,
            cost = %adjustment.cost,
            duration = adjustment.duration_secs,
            applied = ?adjustment.applied,
            "adjusted product"
        );

        self.settle_service(
            tx,
            &user,
            product,
            quantity,
            adjustment.cost,
            adjustment.duration_secs,
            reference,
            now,
        )
        .await
    }

    async fn revert_in_tx(
        &self,
        tx: &mut S::Tx,
        user_external: &str,
        transaction_id: TransactionId,
    ) -> Result<(FiniteTransaction, i64, Product), LedgerError> {
        let now = self.clock.now();
        let user = self.store.user_for_update(tx, user_external, now).await?;

        let original = self
            .store
            .transaction_by_id(tx, transaction_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {transaction_id}")))?;
        if original.user != user.id {
            return Err(LedgerError::NotFound(format!(
                "transaction {transaction_id} for user {user_external}"
            )));
        }
        let product = self.directory.product_by_id(original.product)?;
        if product.cost.is_zero() {
            return Err(LedgerError::Validation(format!(
                "cannot revert zero-cost product {}",
                product.slug
            )));
        }

        let count = (original.amount / product.cost)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .unwrap_or(0)
            .abs();
        if count == 0 {
            return Err(LedgerError::Validation(format!(
                "transaction {transaction_id} settles no whole unit of {}",
                product.slug
            )));
        }

        let reference = format!("revert transaction {transaction_id}");
        let (entry, granted_secs) = self
            .settle_service(
                tx,
                &user,
                &product,
                count,
                -product.cost,
                -product.duration_secs,
                &reference,
                now,
            )
            .await?;
        Ok((entry, granted_secs, product))
    }

    async fn transfer_in_tx(
        &self,
        tx: &mut S::Tx,
        product: &Product,
        from_external: &str,
        to_external: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<(FiniteTransaction, FiniteTransaction), LedgerError> {
        let now = self.clock.now();
        let (sender, receiver) = self
            .store
            .user_pair_for_update(tx, from_external, to_external, now)
            .await?;

        let since = self.config.transfer_window.start(now);
        let sent = self
            .store
            .transfer_stats(tx, product.id, sender.id, since)
            .await?;
        if sent.sent_count >= self.config.max_transfers_sent {
            return Err(LedgerError::RateLimited(format!(
                "sender {from_external} exceeded {} transfers per window",
                self.config.max_transfers_sent
            )));
        }
        let received = self
            .store
            .transfer_stats(tx, product.id, receiver.id, since)
            .await?;
        if received.received_count >= self.config.max_transfers_received {
            return Err(LedgerError::RateLimited(format!(
                "receiver {to_external} exceeded {} transfers per window",
                self.config.max_transfers_received
            )));
        }
        if received.received_volume + amount > self.config.max_received_volume {
            return Err(LedgerError::RateLimited(format!(
                "receiver {to_external} exceeded volume {} per window",
                self.config.max_received_volume
            )));
        }

        let debit = self
            .charge(tx, &sender, product, -amount, reference, now)
            .await?;
        let credit = self
            .charge(tx, &receiver, product, amount, reference, now)
            .await?;
        Ok((debit, credit))
    }

    async fn license_in_tx(
        &self,
        tx: &mut S::Tx,
        product: &Product,
        user_external: &str,
        target_id: &str,
        quantity: i64,
        reference: &str,
    ) -> Result<(FiniteTransaction, i64), LedgerError> {
        let now = self.clock.now();
        let user = self.store.user_for_update(tx, user_external, now).await?;

        let owned = self.owned_groups(tx, &user, now).await?;
        let groups = self.directory.groups_for_product_id(product.id);
        let adjustment = self.rules.adjust(product, &groups, &owned);
        if adjustment.blocked {
            return Err(LedgerError::Validation(format!(
                "purchase of {} blocked by rule",
                product.slug
            )));
        }

        let granted_secs = adjustment.duration_secs * quantity;
        let existing = self.store.license(tx, user.id, product.id, target_id).await?;
        if granted_secs > 0 {
            if let Some(license) = &existing {
                if is_effectively_permanent(license.expires_at, now) {
                    return Err(LedgerError::AlreadyOwned {
                        product_slug: product.slug.clone(),
                        expires_at: license.expires_at,
                    });
                }
            }
        }

        let amount = -(adjustment.cost * Decimal::from(quantity));
        let entry = self.charge(tx, &user, product, amount, reference, now).await?;

        if granted_secs != 0 {
            let expires_at = extended_expiry(
                existing.as_ref().map(|l| l.expires_at),
                now,
                Duration::seconds(granted_secs),
            );
            let row = License {
                id: existing.map(|l| l.id).unwrap_or_else(LicenseId::new),
                user: user.id,
                product: product.id,
                target_id: target_id.to_string(),
                expires_at,
            };
            self.store.put_license(tx, row).await?;
        }
        Ok((entry, granted_secs))
    }

    /// Settlement routine shared by purchase and revert.
    ///
    /// # Sign-flip contract
    ///
    /// Reversal is expressed by negating `unit_cost` and `unit_duration_secs`
    /// **together** while `quantity` stays the positive count. The entry
    /// amount is always `-(unit_cost * quantity)` and the ownership grant
    /// `unit_duration_secs * quantity`, so negated units turn a debit into a
    /// credit and an extension into a shrink. Do not re-derive this: `revert`
    /// relies on it.
    #[allow(clippy::too_many_arguments)]
    async fn settle_service(
        &self,
        tx: &mut S::Tx,
        user: &UserAccount,
        product: &Product,
        quantity: i64,
        unit_cost: Decimal,
        unit_duration_secs: i64,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(FiniteTransaction, i64), LedgerError> {
        let amount = -(unit_cost * Decimal::from(quantity));
        let granted_secs = unit_duration_secs * quantity;

        // A purchase granting time must not stack onto an effectively
        // permanent grant of any linked product.
        if granted_secs > 0 {
            for group in self.directory.groups_for_product_id(product.id) {
                let Some(rep) = self.directory.representative_product(&group) else {
                    continue;
                };
                if let Some(own) = self.store.ownership(tx, user.id, rep.id).await? {
                    if is_effectively_permanent(own.expires_at, now) {
                        return Err(LedgerError::AlreadyOwned {
                            product_slug: rep.slug,
                            expires_at: own.expires_at,
                        });
                    }
                }
            }
        }

        let entry = self.charge(tx, user, product, amount, reference, now).await?;

        if granted_secs != 0 {
            let duration = Duration::seconds(granted_secs);
            for group in self.directory.groups_for_product_id(product.id) {
                let Some(rep) = self.directory.representative_product(&group) else {
                    continue;
                };
                let current = self.store.ownership(tx, user.id, rep.id).await?;
                let expires_at =
                    extended_expiry(current.map(|o| o.expires_at), now, duration);
                self.store
                    .put_ownership(
                        tx,
                        Ownership {
                            user: user.id,
                            product: rep.id,
                            expires_at,
                        },
                    )
                    .await?;
            }
        }

        Ok((entry, granted_secs))
    }

    /// Writes one finite transaction and applies it to the balance.
    ///
    /// Debits are refused when they exceed the available balance, unless the
    /// product is the designated revert sentinel, the only path allowed to
    /// drive a balance negative.
    async fn charge(
        &self,
        tx: &mut S::Tx,
        user: &UserAccount,
        product: &Product,
        amount: Decimal,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<FiniteTransaction, LedgerError> {
        if amount < Decimal::ZERO && product.slug != self.config.revert_product_slug {
            let held = self.store.planned_total(tx, user.id).await?;
            let available = user.available(held);
            if available < -amount {
                return Err(LedgerError::InsufficientFunds {
                    required: -amount,
                    available,
                });
            }
        }

        let entry = self
            .store
            .insert_transaction(
                tx,
                NewTransaction {
                    user: user.id,
                    product: product.id,
                    amount,
                    reference: reference.to_string(),
                    created_at: now,
                },
            )
            .await?;
        self.store.apply_balance(tx, user.id, amount).await?;
        Ok(entry)
    }

    /// Groups of every product the user currently owns
    async fn owned_groups(
        &self,
        tx: &mut S::Tx,
        user: &UserAccount,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>, LedgerError> {
        let mut owned = HashSet::new();
        for ownership in self.store.ownerships_for_user(tx, user.id).await? {
            if ownership.is_active(now) {
                owned.extend(self.directory.groups_for_product_id(ownership.product));
            }
        }
        Ok(owned)
    }

    fn should_retry(&self, err: &LedgerError, attempt: u32) -> bool {
        if err.is_transient() && attempt < self.config.retry_budget {
            warn!(attempt, "serialization conflict, retrying unit of work");
            return true;
        }
        false
    }

    async fn emit(
        &self,
        product: &Product,
        user_external: &str,
        entry: &FiniteTransaction,
        ownership_secs_granted: i64,
    ) {
        let event = LedgerEvent {
            transaction_id: entry.id,
            user_external_id: user_external.to_string(),
            product_slug: product.slug.clone(),
            amount: entry.amount,
            ownership_secs_granted,
            at: entry.created_at,
            product_flags: product.flags,
        };
        if let Err(err) = self.events.publish(&event).await {
            warn!(
                transaction = %entry.id,
                error = %err,
                "event emission failed, entry remains committed"
            );
        }
    }
}
