//! Product type bit-flags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit-flag classification of a product.
///
/// Flags combine: a locked service is `SERVICE | LOCKED`. `DISABLED` marks a
/// superseded or withdrawn product that must stay in the catalog for
/// historical ledger references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductFlags(u32);

impl ProductFlags {
    pub const NONE: ProductFlags = ProductFlags(0);
    /// Grants time-boxed ownership when purchased
    pub const SERVICE: ProductFlags = ProductFlags(1);
    /// One-off item, not time-boxed
    pub const COLLECTABLE: ProductFlags = ProductFlags(1 << 1);
    /// Credits the balance instead of debiting it
    pub const TOP_UP: ProductFlags = ProductFlags(1 << 2);
    /// Not purchasable directly
    pub const LOCKED: ProductFlags = ProductFlags(1 << 3);
    /// Superseded or withdrawn
    pub const DISABLED: ProductFlags = ProductFlags(1 << 4);
    /// Top-up accepting a caller-chosen amount at or above cost
    pub const VARIABLE_PRICE: ProductFlags = ProductFlags(1 << 5);

    /// Creates flags from a raw bit pattern
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every flag in `other` is set
    pub fn contains(self, other: ProductFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the given flags
    pub fn insert(&mut self, other: ProductFlags) {
        self.0 |= other.0;
    }

    /// Clears the given flags
    pub fn remove(&mut self, other: ProductFlags) {
        self.0 &= !other.0;
    }

    /// Returns a copy with the given flags set
    pub fn with(self, other: ProductFlags) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for ProductFlags {
    fn default() -> Self {
        Self::NONE
    }
}

impl BitOr for ProductFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProductFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ProductFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ProductFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u32, &str); 6] = [
            (1, "SERVICE"),
            (1 << 1, "COLLECTABLE"),
            (1 << 2, "TOP_UP"),
            (1 << 3, "LOCKED"),
            (1 << 4, "DISABLED"),
            (1 << 5, "VARIABLE_PRICE"),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let flags = ProductFlags::SERVICE | ProductFlags::LOCKED;
        assert!(flags.contains(ProductFlags::SERVICE));
        assert!(flags.contains(ProductFlags::LOCKED));
        assert!(!flags.contains(ProductFlags::DISABLED));
        assert!(flags.contains(ProductFlags::SERVICE | ProductFlags::LOCKED));
    }

    #[test]
    fn test_insert_remove() {
        let mut flags = ProductFlags::SERVICE;
        flags.insert(ProductFlags::DISABLED);
        assert!(flags.contains(ProductFlags::DISABLED));
        flags.remove(ProductFlags::DISABLED);
        assert!(!flags.contains(ProductFlags::DISABLED));
        assert!(flags.contains(ProductFlags::SERVICE));
    }

    #[test]
    fn test_display() {
        let flags = ProductFlags::TOP_UP | ProductFlags::VARIABLE_PRICE;
        assert_eq!(flags.to_string(), "TOP_UP|VARIABLE_PRICE");
        assert_eq!(ProductFlags::NONE.to_string(), "NONE");
    }

    #[test]
    fn test_bits_round_trip() {
        let flags = ProductFlags::SERVICE | ProductFlags::COLLECTABLE;
        assert_eq!(ProductFlags::from_bits(flags.bits()), flags);
    }
}
