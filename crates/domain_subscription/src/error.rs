//! Subscription domain errors

use thiserror::Error;

use domain_ledger::LedgerError;

/// Errors that can occur while reconciling a lifecycle notification
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Malformed notification (e.g. trial without an end date)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown product or provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// The underlying ledger operation failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
