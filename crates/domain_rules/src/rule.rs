//! Rule types and flags

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use core_kernel::RuleId;

/// Bit-flags controlling how a rule's amount is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleFlags(u32);

impl RuleFlags {
    pub const NONE: RuleFlags = RuleFlags(0);
    /// Negate the amount before applying
    pub const INVERT: RuleFlags = RuleFlags(1);
    /// Scale the amount by the current value of the target field (percent)
    pub const PERCENT: RuleFlags = RuleFlags(1 << 1);
    /// Marker: the rule grants extra duration
    pub const LONGER: RuleFlags = RuleFlags(1 << 2);
    /// The rule targets cost instead of duration
    pub const DISCOUNT: RuleFlags = RuleFlags(1 << 3);
    /// Stop evaluating lower-priority rules after this one
    pub const EARLY_BREAK: RuleFlags = RuleFlags(1 << 4);
    /// The adjusted product cannot be bought
    pub const BLOCK_PURCHASE: RuleFlags = RuleFlags(1 << 5);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: RuleFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for RuleFlags {
    fn default() -> Self {
        Self::NONE
    }
}

impl BitOr for RuleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RuleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RuleFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for RuleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u32, &str); 6] = [
            (1, "INVERT"),
            (1 << 1, "PERCENT"),
            (1 << 2, "LONGER"),
            (1 << 3, "DISCOUNT"),
            (1 << 4, "EARLY_BREAK"),
            (1 << 5, "BLOCK_PURCHASE"),
        ];

        if self.0 == 0 {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A conditional price/duration modifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier
    pub id: RuleId,
    /// Unique rule name
    pub slug: String,
    /// Higher priority applies first; declaration order breaks ties
    pub priority: i32,
    /// Group the user must own a product of; None applies unconditionally
    pub requires: Option<String>,
    /// Group of products the rule modifies
    pub targets: String,
    /// Application flags
    pub flags: RuleFlags,
    /// Magnitude of the change (credits, seconds, or percent)
    pub amount: Decimal,
}

/// Caller-facing rule definition; the engine assigns the identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub slug: String,
    pub priority: i32,
    pub requires: Option<String>,
    pub targets: String,
    pub flags: RuleFlags,
    pub amount: Decimal,
}
