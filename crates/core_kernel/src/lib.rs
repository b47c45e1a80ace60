//! Core Kernel - Foundational types and utilities for the billing system
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Temporal rules for time-boxed ownership
//! - Strongly-typed identifiers
//! - The clock port used to inject time into services

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod clock;
pub mod error;

pub use money::{Money, Currency, MoneyError};
pub use temporal::{
    extended_expiry, is_effectively_permanent, RollingWindow, PERMANENT_OWNERSHIP_DAYS,
};
pub use identifiers::{
    UserId, ProductId, GroupId, RuleId, TransactionId, PlannedTransactionId, LicenseId, EventId,
};
pub use clock::{Clock, SystemClock};
pub use error::CoreError;
