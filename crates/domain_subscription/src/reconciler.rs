//! Lifecycle reconciliation
//!
//! One entry point, [`Reconciler::reconcile`], fed by gateway adapters with
//! normalized notifications. Settlement is `credit_top_up` followed by
//! `purchase_service` of the same product; subscription products carry both
//! the top-up kind and the `SERVICE` flag, so the credit and the debit net
//! to zero while ownership is extended. Both references derive from the
//! provider transaction id, which is what makes replays harmless.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use core_kernel::Clock;
use domain_catalog::GroupDirectory;
use domain_ledger::{Ledger, LedgerError, LedgerStore, Ownership};

use crate::error::SubscriptionError;
use crate::notification::{LifecycleState, SubscriptionNotification};
use crate::provider::ProviderRegistry;

/// What a notification amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ownership extended to the trial end
    TrialGranted,
    /// Trial already consumed; nothing changed
    TrialAlreadyUsed,
    /// Credit and purchase committed
    Settled,
    /// Both ledger writes were replays; nothing changed
    AlreadySettled,
    /// The notification required no action
    Ignored,
}

/// Translates lifecycle notifications into ledger calls
pub struct Reconciler<S: LedgerStore> {
    ledger: Arc<Ledger<S>>,
    store: Arc<S>,
    directory: Arc<GroupDirectory>,
    clock: Arc<dyn Clock>,
    providers: ProviderRegistry,
}

impl<S: LedgerStore> Reconciler<S> {
    /// Creates a reconciler over the ledger's store and directory
    pub fn new(
        ledger: Arc<Ledger<S>>,
        clock: Arc<dyn Clock>,
        providers: ProviderRegistry,
    ) -> Self {
        let store = ledger.store();
        let directory = ledger.directory();
        Self {
            ledger,
            store,
            directory,
            clock,
            providers,
        }
    }

    /// Applies one lifecycle notification.
    ///
    /// Safe to call with replayed notifications: trials are one-shot per
    /// (user, product), and settlement references derive from the provider
    /// transaction id.
    pub async fn reconcile(
        &self,
        notification: &SubscriptionNotification,
    ) -> Result<Outcome, SubscriptionError> {
        match notification.state {
            LifecycleState::OnTrial => self.grant_trial(notification).await,
            LifecycleState::PaymentSuccess => self.settle(notification).await,
            LifecycleState::Created | LifecycleState::Active => {
                let settles_here = self
                    .providers
                    .get(&notification.provider)
                    .map(|p| p.settles_on_activation)
                    .unwrap_or(false);
                if settles_here {
                    self.settle(notification).await
                } else {
                    debug!(
                        provider = %notification.provider,
                        state = ?notification.state,
                        "activation event ignored, provider settles on payment"
                    );
                    Ok(Outcome::Ignored)
                }
            }
            LifecycleState::Cancelled => {
                info!(
                    provider = %notification.provider,
                    user = %notification.user_external_id,
                    product = %notification.product_slug,
                    "subscription cancelled"
                );
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Extends ownership to the trial end without crediting the ledger.
    ///
    /// The trial record insert and the ownership extension share one unit of
    /// work; a consumed trial rolls the whole thing back.
    async fn grant_trial(
        &self,
        notification: &SubscriptionNotification,
    ) -> Result<Outcome, SubscriptionError> {
        let trial_end = notification.trial_end.ok_or_else(|| {
            SubscriptionError::Validation("trial notification without trial end".to_string())
        })?;
        let product = self
            .directory
            .product_by_slug(&notification.product_slug)
            .map_err(|e| SubscriptionError::NotFound(e.to_string()))?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await.map_err(LedgerError::from)?;
        let outcome: Result<Outcome, LedgerError> = async {
            let user = self
                .store
                .user_for_update(&mut tx, &notification.user_external_id, now)
                .await?;
            if !self
                .store
                .try_mark_trial(&mut tx, user.id, product.id, now)
                .await?
            {
                return Ok(Outcome::TrialAlreadyUsed);
            }
            let current = self.store.ownership(&mut tx, user.id, product.id).await?;
            // A trial never shortens an existing grant.
            let expires_at = match current {
                Some(own) if own.expires_at > trial_end => own.expires_at,
                _ => trial_end,
            };
            self.store
                .put_ownership(
                    &mut tx,
                    Ownership {
                        user: user.id,
                        product: product.id,
                        expires_at,
                    },
                )
                .await?;
            Ok(Outcome::TrialGranted)
        }
        .await;

        match outcome {
            Ok(Outcome::TrialGranted) => {
                self.store.commit(tx).await.map_err(LedgerError::from)?;
                info!(
                    user = %notification.user_external_id,
                    product = %notification.product_slug,
                    until = %trial_end,
                    "trial granted"
                );
                Ok(Outcome::TrialGranted)
            }
            Ok(other) => {
                let _ = self.store.rollback(tx).await;
                Ok(other)
            }
            Err(err) => {
                let _ = self.store.rollback(tx).await;
                Err(err.into())
            }
        }
    }

    /// Credit plus purchase, both keyed off the provider transaction id.
    ///
    /// A replay may find the credit already settled but not the purchase
    /// (a crash between the two calls), so the purchase is attempted
    /// regardless of the credit being a duplicate.
    async fn settle(
        &self,
        notification: &SubscriptionNotification,
    ) -> Result<Outcome, SubscriptionError> {
        let product = self
            .directory
            .product_by_slug(&notification.product_slug)
            .map_err(|e| SubscriptionError::NotFound(e.to_string()))?;

        let credit_reference = format!("{}-topup", notification.external_transaction_id);
        let purchase_reference = format!("{}-service", notification.external_transaction_id);

        match self
            .ledger
            .credit_top_up(
                product.id,
                &notification.user_external_id,
                &credit_reference,
                Decimal::ZERO,
            )
            .await
        {
            Ok(_) | Err(LedgerError::DuplicateTransaction { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        match self
            .ledger
            .purchase_service(
                &notification.product_slug,
                &notification.user_external_id,
                1,
                &purchase_reference,
            )
            .await
        {
            Ok(_) => Ok(Outcome::Settled),
            Err(LedgerError::DuplicateTransaction { .. }) => Ok(Outcome::AlreadySettled),
            Err(err) => Err(err.into()),
        }
    }
}
