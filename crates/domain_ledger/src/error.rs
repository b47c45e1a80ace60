//! Ledger domain errors
//!
//! Every variant except `Storage` is recoverable and user-facing; the
//! boundary maps kinds to transport responses without rewrapping. `Storage`
//! carries the transient flag so callers can distinguish a retryable
//! serialization conflict from a dead backend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::store::StoreError;
use domain_catalog::CatalogError;
use domain_rules::RuleError;

/// Errors that can occur in ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Unknown product, transaction, group, or rule
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request
    #[error("Validation error: {0}")]
    Validation(String),

    /// The (product, user, reference) triple was already settled; callers
    /// treat this as success-already-applied
    #[error("Duplicate transaction for reference {reference}")]
    DuplicateTransaction { reference: String },

    /// Available balance below the adjusted price
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Linked ownership already extends past the permanent threshold
    #[error("Already owned: {product_slug} until {expires_at}")]
    AlreadyOwned {
        product_slug: String,
        expires_at: DateTime<Utc>,
    },

    /// Transfer limits exceeded
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Storage failure; fatal for the request once the retry budget is spent
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl LedgerError {
    /// Returns true for faults worth retrying at the caller
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_transient())
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateReference { reference, .. } => {
                LedgerError::DuplicateTransaction { reference }
            }
            StoreError::RowNotFound(what) => LedgerError::NotFound(what),
            other => LedgerError::Storage(other),
        }
    }
}

impl From<CatalogError> for LedgerError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::ProductNotFound(s) => LedgerError::NotFound(format!("product {s}")),
            CatalogError::GroupNotFound(s) => LedgerError::NotFound(format!("group {s}")),
            CatalogError::DuplicateSlug(s) => {
                LedgerError::Validation(format!("duplicate product slug {s}"))
            }
            CatalogError::Validation(s) => LedgerError::Validation(s),
        }
    }
}

impl From<RuleError> for LedgerError {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::RuleNotFound(s) => LedgerError::NotFound(format!("rule {s}")),
            RuleError::TargetGroupNotFound(s) | RuleError::RequiresGroupNotFound(s) => {
                LedgerError::NotFound(format!("group {s}"))
            }
            other => LedgerError::Validation(other.to_string()),
        }
    }
}
