//! Rules domain errors

use thiserror::Error;

/// Errors that can occur when defining rules
#[derive(Debug, Error)]
pub enum RuleError {
    /// `targets` names a group that does not exist
    #[error("Target group not found: {0}")]
    TargetGroupNotFound(String),

    /// `requires` names a group that does not exist
    #[error("Requires group not found: {0}")]
    RequiresGroupNotFound(String),

    /// DISCOUNT and LONGER cannot be combined on one rule
    #[error("Rule {0}: DISCOUNT and LONGER are mutually exclusive")]
    ConflictingFlags(String),

    /// Negative amount, or zero amount on a rule that must change something
    #[error("Rule {slug}: invalid amount {amount}")]
    InvalidAmount { slug: String, amount: String },

    /// Unknown rule slug
    #[error("Rule not found: {0}")]
    RuleNotFound(String),
}
