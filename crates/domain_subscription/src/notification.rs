//! Lifecycle notification payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription lifecycle states reported by providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Active,
    OnTrial,
    PaymentSuccess,
    Cancelled,
}

/// A normalized lifecycle notification
///
/// Gateway adapters map their wire formats into this shape before handing
/// it to the reconciler. `external_transaction_id` must be stable across
/// replays of the same event; it seeds the ledger's idempotency references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionNotification {
    /// Provider slug, e.g. "cardgate" or "mobilestore"
    pub provider: String,
    /// Provider-stable transaction or event id
    pub external_transaction_id: String,
    /// Slug of the subscribed product
    pub product_slug: String,
    /// The subscriber's external id
    pub user_external_id: String,
    /// Lifecycle state carried by the notification
    pub state: LifecycleState,
    /// Trial end, present on `OnTrial` notifications
    pub trial_end: Option<DateTime<Utc>>,
}
