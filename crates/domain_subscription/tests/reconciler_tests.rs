//! Integration tests for subscription reconciliation

use std::sync::Arc;

use chrono::Duration;
use rust_decimal_macros::dec;

use core_kernel::Clock;
use domain_ledger::LedgerStore;
use domain_subscription::{
    LifecycleState, Outcome, ProviderProfile, ProviderRegistry, Reconciler,
    SubscriptionNotification,
};
use test_utils::{LedgerHarness, ProductBuilder};

fn notification(state: LifecycleState) -> SubscriptionNotification {
    SubscriptionNotification {
        provider: "cardgate".to_string(),
        external_transaction_id: "ext-1001".to_string(),
        product_slug: "premium".to_string(),
        user_external_id: "u1".to_string(),
        state,
        trial_end: None,
    }
}

fn reconciler_over(h: &LedgerHarness) -> Reconciler<domain_ledger::MemoryStore> {
    let mut providers = ProviderRegistry::new();
    providers.register(ProviderProfile::with_payment_events("cardgate"));
    providers.register(ProviderProfile::activation_settled("mobilestore"));
    Reconciler::new(Arc::clone(&h.ledger), h.clock.clone(), providers)
}

fn register_subscription_product(h: &LedgerHarness) {
    h.directory
        .register(
            ProductBuilder::subscription("premium")
                .cost(dec!(10))
                .duration_secs(2_592_000)
                .build(),
        )
        .unwrap();
}

#[tokio::test]
async fn test_trial_grant_extends_ownership_without_ledger_entry() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    let trial_end = h.clock.now() + Duration::days(14);
    let mut n = notification(LifecycleState::OnTrial);
    n.trial_end = Some(trial_end);

    let outcome = reconciler.reconcile(&n).await.unwrap();
    assert_eq!(outcome, Outcome::TrialGranted);

    let product = h.directory.product_by_slug("premium").unwrap();
    let mut tx = h.store.begin().await.unwrap();
    let user = h.store.find_user(&mut tx, "u1").await.unwrap().unwrap();
    let ownership = h
        .store
        .ownership(&mut tx, user.id, product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ownership.expires_at, trial_end);

    // No money moved and no ledger entry was written.
    assert_eq!(user.balance, dec!(0));
    assert!(h
        .store
        .transactions_for_user(&mut tx, user.id)
        .await
        .unwrap()
        .is_empty());
    h.store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_trial_replay_is_a_no_op() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    let mut n = notification(LifecycleState::OnTrial);
    n.trial_end = Some(h.clock.now() + Duration::days(14));
    reconciler.reconcile(&n).await.unwrap();

    // Replay with a later end date: trial is consumed, nothing changes.
    let first_end = n.trial_end.unwrap();
    n.trial_end = Some(h.clock.now() + Duration::days(60));
    let outcome = reconciler.reconcile(&n).await.unwrap();
    assert_eq!(outcome, Outcome::TrialAlreadyUsed);

    let product = h.directory.product_by_slug("premium").unwrap();
    let mut tx = h.store.begin().await.unwrap();
    let user = h.store.find_user(&mut tx, "u1").await.unwrap().unwrap();
    let ownership = h
        .store
        .ownership(&mut tx, user.id, product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ownership.expires_at, first_end);
    h.store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_trial_without_end_date_is_invalid() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    let n = notification(LifecycleState::OnTrial);
    let err = reconciler.reconcile(&n).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_payment_success_settles_credit_and_purchase() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    let outcome = reconciler
        .reconcile(&notification(LifecycleState::PaymentSuccess))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Settled);

    let product = h.directory.product_by_slug("premium").unwrap();
    let mut tx = h.store.begin().await.unwrap();
    let user = h.store.find_user(&mut tx, "u1").await.unwrap().unwrap();

    // Credit and debit net to zero; ownership is extended.
    assert_eq!(user.balance, dec!(0));
    let entries = h.store.transactions_for_user(&mut tx, user.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().any(|e| e.reference == "ext-1001-topup"));
    assert!(entries.iter().any(|e| e.reference == "ext-1001-service"));

    let ownership = h
        .store
        .ownership(&mut tx, user.id, product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        ownership.expires_at,
        h.clock.now() + Duration::seconds(2_592_000)
    );
    h.store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_payment_success_replay_is_a_no_op() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    let n = notification(LifecycleState::PaymentSuccess);
    reconciler.reconcile(&n).await.unwrap();
    let replay = reconciler.reconcile(&n).await.unwrap();
    assert_eq!(replay, Outcome::AlreadySettled);

    let mut tx = h.store.begin().await.unwrap();
    let user = h.store.find_user(&mut tx, "u1").await.unwrap().unwrap();
    assert_eq!(user.balance, dec!(0));
    assert_eq!(
        h.store
            .transactions_for_user(&mut tx, user.id)
            .await
            .unwrap()
            .len(),
        2
    );
    h.store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_activation_only_settles_for_profiled_providers() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    // cardgate sends a separate payment event: activation must not settle.
    let ignored = reconciler
        .reconcile(&notification(LifecycleState::Active))
        .await
        .unwrap();
    assert_eq!(ignored, Outcome::Ignored);

    // mobilestore signals success via activation: it settles.
    let mut n = notification(LifecycleState::Created);
    n.provider = "mobilestore".to_string();
    let settled = reconciler.reconcile(&n).await.unwrap();
    assert_eq!(settled, Outcome::Settled);

    let mut tx = h.store.begin().await.unwrap();
    let user = h.store.find_user(&mut tx, "u1").await.unwrap().unwrap();
    assert_eq!(
        h.store
            .transactions_for_user(&mut tx, user.id)
            .await
            .unwrap()
            .len(),
        2
    );
    h.store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_cancellation_changes_nothing() {
    let h = LedgerHarness::new();
    register_subscription_product(&h);
    let reconciler = reconciler_over(&h);

    let outcome = reconciler
        .reconcile(&notification(LifecycleState::Cancelled))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Ignored);

    let mut tx = h.store.begin().await.unwrap();
    assert!(h.store.find_user(&mut tx, "u1").await.unwrap().is_none());
    h.store.rollback(tx).await.unwrap();
}
