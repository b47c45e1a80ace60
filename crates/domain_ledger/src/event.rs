//! Outbound domain events
//!
//! Every committed finite transaction produces exactly one event. Delivery
//! is at-least-once: emission happens after commit and a failed sink never
//! rolls a committed entry back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use core_kernel::TransactionId;
use domain_catalog::ProductFlags;

/// Event emitted for one committed ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub transaction_id: TransactionId,
    pub user_external_id: String,
    pub product_slug: String,
    /// Signed amount of the underlying transaction
    pub amount: Decimal,
    /// Ownership seconds granted by the settlement (0 for credits/transfers)
    pub ownership_secs_granted: i64,
    pub at: DateTime<Utc>,
    pub product_flags: ProductFlags,
}

/// Event sink failure
#[derive(Debug, Error)]
#[error("Event sink error: {0}")]
pub struct EventError(pub String);

/// Delivery port for outbound events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), EventError>;
}

/// Sink that writes events to the log; the default when no broker is wired
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), EventError> {
        info!(
            transaction = %event.transaction_id,
            user = %event.user_external_id,
            product = %event.product_slug,
            amount = %event.amount,
            ownership_secs = event.ownership_secs_granted,
            "ledger event"
        );
        Ok(())
    }
}
