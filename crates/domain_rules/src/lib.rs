//! Rules Domain - Conditional Pricing
//!
//! Rules reprice or re-time a product before settlement, gated by what
//! groups of products the buying user already owns. Evaluation is
//! deterministic: select by group, order by priority (declaration order as
//! tie-break), fold flag by flag, honor early exit.
//!
//! The engine is a pure function of (rule set, product, ownership snapshot);
//! it holds no clock and performs no I/O, which is what makes the adjusted
//! price previewable before a purchase commits.

pub mod rule;
pub mod engine;
pub mod error;

pub use rule::{Rule, RuleFlags, RuleSpec};
pub use engine::{Adjustment, RuleEngine};
pub use error::RuleError;
