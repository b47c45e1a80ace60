//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible
//! defaults. Tests specify only the fields they care about.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money};
use domain_catalog::{Product, ProductFlags};
use domain_rules::{RuleFlags, RuleSpec};

/// Builder for catalog products
pub struct ProductBuilder {
    slug: String,
    cost: Decimal,
    duration_secs: i64,
    flags: ProductFlags,
    top_up: Option<(Money, String)>,
}

impl ProductBuilder {
    /// A service product with a small cost and a one-minute duration
    pub fn service(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            cost: dec!(5),
            duration_secs: 60,
            flags: ProductFlags::NONE,
            top_up: None,
        }
    }

    /// A top-up product crediting its cost for a fixed USD price
    pub fn top_up(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            cost: dec!(100),
            duration_secs: 0,
            flags: ProductFlags::NONE,
            top_up: Some((Money::new(dec!(4.99), Currency::USD), "cardgate".to_string())),
        }
    }

    /// A subscription product: top-up kind with the SERVICE flag, so the
    /// reconciler's credit-then-purchase nets to zero while granting time
    pub fn subscription(slug: impl Into<String>) -> Self {
        let mut builder = Self::top_up(slug);
        builder.cost = dec!(10);
        builder.duration_secs = 2_592_000;
        builder.flags = ProductFlags::SERVICE;
        builder
    }

    pub fn cost(mut self, cost: Decimal) -> Self {
        self.cost = cost;
        self
    }

    pub fn duration_secs(mut self, secs: i64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn flags(mut self, flags: ProductFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn price(mut self, price: Money) -> Self {
        if let Some((_, provider)) = self.top_up.take() {
            self.top_up = Some((price, provider));
        }
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        if let Some((price, _)) = self.top_up.take() {
            self.top_up = Some((price, provider.into()));
        }
        self
    }

    pub fn build(self) -> Product {
        let product = match self.top_up {
            Some((price, provider)) => {
                Product::top_up(self.slug, self.cost, price, provider)
            }
            None => Product::service(self.slug, self.cost, self.duration_secs),
        };
        let mut product = product.with_flags(self.flags);
        product.duration_secs = self.duration_secs;
        product
    }
}

/// Builder for rule specs
pub struct RuleSpecBuilder {
    slug: String,
    priority: i32,
    requires: Option<String>,
    targets: String,
    flags: RuleFlags,
    amount: Decimal,
}

impl RuleSpecBuilder {
    /// A rule targeting the given group, priority 0, no condition
    pub fn targeting(slug: impl Into<String>, targets: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            priority: 0,
            requires: None,
            targets: targets.into(),
            flags: RuleFlags::NONE,
            amount: dec!(1),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn requires(mut self, group: impl Into<String>) -> Self {
        self.requires = Some(group.into());
        self
    }

    pub fn flags(mut self, flags: RuleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn build(self) -> RuleSpec {
        RuleSpec {
            slug: self.slug,
            priority: self.priority,
            requires: self.requires,
            targets: self.targets,
            flags: self.flags,
            amount: self.amount,
        }
    }
}
