//! Product types
//!
//! A product is either purchaseable with internal credits or a top-up that
//! converts a real-world payment into credits. The two variants share one
//! row shape with a kind discriminator; top-ups additionally carry the fixed
//! provider price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Money, ProductId};

use crate::flags::ProductFlags;

/// Kind discriminator with kind-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductKind {
    /// Bought with internal credits
    Purchaseable,
    /// Credits the balance; settled by an external provider
    TopUp(TopUpDetails),
}

/// Fixed pricing of a top-up product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpDetails {
    /// Real-world price charged by the provider
    pub price: Money,
    /// Slug of the payment provider that settles this product
    pub provider: String,
}

/// A catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier, stable across supersedure
    pub id: ProductId,
    /// Unique among active products
    pub slug: String,
    /// Cost in internal credits (the amount credited, for top-ups)
    pub cost: Decimal,
    /// Ownership seconds granted per unit purchased
    pub duration_secs: i64,
    /// Type flags
    pub flags: ProductFlags,
    /// Kind discriminator
    pub kind: ProductKind,
}

impl Product {
    /// Creates a purchaseable service product
    pub fn service(slug: impl Into<String>, cost: Decimal, duration_secs: i64) -> Self {
        Self {
            id: ProductId::new(),
            slug: slug.into(),
            cost,
            duration_secs,
            flags: ProductFlags::SERVICE,
            kind: ProductKind::Purchaseable,
        }
    }

    /// Creates a top-up product with a fixed provider price
    pub fn top_up(
        slug: impl Into<String>,
        credited: Decimal,
        price: Money,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: ProductId::new(),
            slug: slug.into(),
            cost: credited,
            duration_secs: 0,
            flags: ProductFlags::TOP_UP,
            kind: ProductKind::TopUp(TopUpDetails {
                price,
                provider: provider.into(),
            }),
        }
    }

    /// Adds flags on top of the kind's defaults
    pub fn with_flags(mut self, flags: ProductFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_service(&self) -> bool {
        self.flags.contains(ProductFlags::SERVICE)
    }

    pub fn is_top_up(&self) -> bool {
        matches!(self.kind, ProductKind::TopUp(_))
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(ProductFlags::DISABLED)
    }

    /// Returns the top-up details for top-up products
    pub fn top_up_details(&self) -> Option<&TopUpDetails> {
        match &self.kind {
            ProductKind::TopUp(details) => Some(details),
            ProductKind::Purchaseable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_service_product_defaults() {
        let p = Product::service("premium", dec!(5), 2_592_000);
        assert!(p.is_service());
        assert!(!p.is_top_up());
        assert!(!p.is_disabled());
        assert!(p.top_up_details().is_none());
    }

    #[test]
    fn test_top_up_product_carries_price() {
        let p = Product::top_up(
            "topup-100",
            dec!(100),
            Money::new(dec!(4.99), Currency::USD),
            "cardgate",
        );
        assert!(p.is_top_up());
        let details = p.top_up_details().unwrap();
        assert_eq!(details.provider, "cardgate");
        assert_eq!(details.price.amount(), dec!(4.99));
    }

    #[test]
    fn test_with_flags_accumulates() {
        let p = Product::service("vip", dec!(10), 60).with_flags(ProductFlags::LOCKED);
        assert!(p.flags.contains(ProductFlags::SERVICE | ProductFlags::LOCKED));
    }
}
