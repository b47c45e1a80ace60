//! Rule evaluation engine
//!
//! Holds the rule set behind a read-write lock in declaration order and
//! evaluates it against a product and an ownership snapshot. Declaration
//! order matters: it is the stable tie-break between equal priorities, so
//! upserts replace a rule in place instead of reordering it.

use std::collections::HashSet;
use std::sync::RwLock;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use core_kernel::RuleId;
use domain_catalog::{GroupDirectory, Product};

use crate::error::RuleError;
use crate::rule::{Rule, RuleFlags, RuleSpec};

/// Result of adjusting a product for one user
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    /// Adjusted cost in credits
    pub cost: Decimal,
    /// Adjusted ownership seconds
    pub duration_secs: i64,
    /// Slugs of the rules that applied, in application order
    pub applied: Vec<String>,
    /// True when an applied rule forbids buying the product
    pub blocked: bool,
}

/// Priority-ordered rule evaluator
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: RwLock<Vec<Rule>>,
}

impl RuleEngine {
    /// Creates an engine with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the rule named by `spec.slug`.
    ///
    /// A replaced rule keeps its position in declaration order.
    ///
    /// # Errors
    ///
    /// - `TargetGroupNotFound` / `RequiresGroupNotFound` if a named group is
    ///   unknown to the directory
    /// - `ConflictingFlags` when DISCOUNT and LONGER are both set
    /// - `InvalidAmount` when the amount is negative, or zero on a
    ///   DISCOUNT/LONGER rule
    pub fn upsert(&self, spec: RuleSpec, directory: &GroupDirectory) -> Result<RuleId, RuleError> {
        if !directory.group_exists(&spec.targets) {
            return Err(RuleError::TargetGroupNotFound(spec.targets));
        }
        if let Some(required) = &spec.requires {
            if !directory.group_exists(required) {
                return Err(RuleError::RequiresGroupNotFound(required.clone()));
            }
        }
        if spec.flags.contains(RuleFlags::DISCOUNT) && spec.flags.contains(RuleFlags::LONGER) {
            return Err(RuleError::ConflictingFlags(spec.slug));
        }
        let must_change =
            spec.flags.contains(RuleFlags::DISCOUNT) || spec.flags.contains(RuleFlags::LONGER);
        if spec.amount < Decimal::ZERO || (must_change && spec.amount.is_zero()) {
            return Err(RuleError::InvalidAmount {
                slug: spec.slug,
                amount: spec.amount.to_string(),
            });
        }

        let mut rules = self.rules.write().expect("rule lock poisoned");
        if let Some(existing) = rules.iter_mut().find(|r| r.slug == spec.slug) {
            existing.priority = spec.priority;
            existing.requires = spec.requires;
            existing.targets = spec.targets;
            existing.flags = spec.flags;
            existing.amount = spec.amount;
            return Ok(existing.id);
        }

        let rule = Rule {
            id: RuleId::new(),
            slug: spec.slug,
            priority: spec.priority,
            requires: spec.requires,
            targets: spec.targets,
            flags: spec.flags,
            amount: spec.amount,
        };
        let id = rule.id;
        debug!(rule = %rule.slug, priority = rule.priority, "registered rule");
        rules.push(rule);
        Ok(id)
    }

    /// Removes a rule by slug
    pub fn remove(&self, slug: &str) -> Result<(), RuleError> {
        let mut rules = self.rules.write().expect("rule lock poisoned");
        let before = rules.len();
        rules.retain(|r| r.slug != slug);
        if rules.len() == before {
            return Err(RuleError::RuleNotFound(slug.to_string()));
        }
        Ok(())
    }

    /// Adjusts a product's (cost, duration) against an ownership snapshot.
    ///
    /// `owned_groups` is the set of groups of every product the user
    /// currently owns; `product_groups` the groups of the candidate product.
    /// Pure: no I/O, no clock, identical inputs give identical output.
    pub fn adjust(
        &self,
        product: &Product,
        product_groups: &[String],
        owned_groups: &HashSet<String>,
    ) -> Adjustment {
        let rules = self.rules.read().expect("rule lock poisoned");

        let mut selected: Vec<&Rule> = rules
            .iter()
            .filter(|r| {
                r.requires
                    .as_ref()
                    .map_or(true, |req| owned_groups.contains(req))
                    && product_groups.iter().any(|g| g == &r.targets)
            })
            .collect();
        // Stable sort keeps declaration order between equal priorities.
        selected.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut cost = product.cost;
        let mut duration = Decimal::from(product.duration_secs);
        let mut applied = Vec::new();
        let mut blocked = false;

        for rule in selected {
            let targets_cost = rule.flags.contains(RuleFlags::DISCOUNT);
            let current = if targets_cost { cost } else { duration };

            let mut change = rule.amount;
            if rule.flags.contains(RuleFlags::INVERT) {
                change = -change;
            }
            if rule.flags.contains(RuleFlags::PERCENT) {
                change = current * change / Decimal::from(100);
            }

            if targets_cost {
                cost -= change;
            } else {
                duration += change;
            }

            if rule.flags.contains(RuleFlags::BLOCK_PURCHASE) {
                blocked = true;
            }
            applied.push(rule.slug.clone());

            if rule.flags.contains(RuleFlags::EARLY_BREAK) {
                break;
            }
        }

        Adjustment {
            cost,
            duration_secs: duration
                .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
                .to_i64()
                .unwrap_or(i64::MAX),
            applied,
            blocked,
        }
    }

    /// Returns a snapshot of the rule set in declaration order
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.read().expect("rule lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn directory() -> GroupDirectory {
        let dir = GroupDirectory::new();
        dir.register(Product::service("svc", dec!(100), 600)).unwrap();
        dir.register(Product::service("base", dec!(10), 60)).unwrap();
        dir.add_to_group("svc", "promo").unwrap();
        dir
    }

    fn spec(slug: &str, priority: i32, flags: RuleFlags, amount: Decimal) -> RuleSpec {
        RuleSpec {
            slug: slug.to_string(),
            priority,
            requires: None,
            targets: "svc".to_string(),
            flags,
            amount,
        }
    }

    #[test]
    fn test_upsert_validates_target_group() {
        let dir = directory();
        let engine = RuleEngine::new();
        let mut s = spec("r", 1, RuleFlags::NONE, dec!(1));
        s.targets = "ghost".into();
        assert!(matches!(
            engine.upsert(s, &dir),
            Err(RuleError::TargetGroupNotFound(_))
        ));
    }

    #[test]
    fn test_upsert_validates_requires_group() {
        let dir = directory();
        let engine = RuleEngine::new();
        let mut s = spec("r", 1, RuleFlags::NONE, dec!(1));
        s.requires = Some("ghost".into());
        assert!(matches!(
            engine.upsert(s, &dir),
            Err(RuleError::RequiresGroupNotFound(_))
        ));
    }

    #[test]
    fn test_discount_and_longer_conflict() {
        let dir = directory();
        let engine = RuleEngine::new();
        let s = spec("r", 1, RuleFlags::DISCOUNT | RuleFlags::LONGER, dec!(1));
        assert!(matches!(
            engine.upsert(s, &dir),
            Err(RuleError::ConflictingFlags(_))
        ));
    }

    #[test]
    fn test_amount_validation() {
        let dir = directory();
        let engine = RuleEngine::new();

        assert!(matches!(
            engine.upsert(spec("neg", 1, RuleFlags::NONE, dec!(-1)), &dir),
            Err(RuleError::InvalidAmount { .. })
        ));
        assert!(matches!(
            engine.upsert(spec("zero-discount", 1, RuleFlags::DISCOUNT, dec!(0)), &dir),
            Err(RuleError::InvalidAmount { .. })
        ));
        // A zero-amount gate rule without DISCOUNT/LONGER is allowed.
        engine
            .upsert(spec("gate", 1, RuleFlags::BLOCK_PURCHASE, dec!(0)), &dir)
            .unwrap();
    }

    #[test]
    fn test_percent_discount_reduces_cost() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine
            .upsert(
                spec("promo", 1, RuleFlags::DISCOUNT | RuleFlags::PERCENT, dec!(20)),
                &dir,
            )
            .unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();
        let adj = engine.adjust(&product, &groups, &HashSet::new());

        assert_eq!(adj.cost, dec!(80));
        assert_eq!(adj.duration_secs, 600);
        assert_eq!(adj.applied, vec!["promo"]);
        assert!(!adj.blocked);
    }

    #[test]
    fn test_early_break_stops_evaluation() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine
            .upsert(spec("a", 2, RuleFlags::EARLY_BREAK, dec!(30)), &dir)
            .unwrap();
        engine.upsert(spec("b", 1, RuleFlags::NONE, dec!(60)), &dir).unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();
        let adj = engine.adjust(&product, &groups, &HashSet::new());

        assert_eq!(adj.applied, vec!["a"]);
        assert_eq!(adj.duration_secs, 630);
    }

    #[test]
    fn test_invert_negates_change() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine
            .upsert(spec("shorter", 1, RuleFlags::INVERT, dec!(120)), &dir)
            .unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();
        let adj = engine.adjust(&product, &groups, &HashSet::new());

        assert_eq!(adj.duration_secs, 480);
    }

    #[test]
    fn test_percent_applies_to_current_value() {
        let dir = directory();
        let engine = RuleEngine::new();
        // Two 50% discounts compound: 100 -> 50 -> 25.
        engine
            .upsert(
                spec("half-1", 2, RuleFlags::DISCOUNT | RuleFlags::PERCENT, dec!(50)),
                &dir,
            )
            .unwrap();
        engine
            .upsert(
                spec("half-2", 1, RuleFlags::DISCOUNT | RuleFlags::PERCENT, dec!(50)),
                &dir,
            )
            .unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();
        let adj = engine.adjust(&product, &groups, &HashSet::new());

        assert_eq!(adj.cost, dec!(25));
    }

    #[test]
    fn test_requires_gates_on_owned_groups() {
        let dir = directory();
        let engine = RuleEngine::new();
        let mut s = spec("loyalty", 1, RuleFlags::DISCOUNT, dec!(10));
        s.requires = Some("base".into());
        engine.upsert(s, &dir).unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();

        let without = engine.adjust(&product, &groups, &HashSet::new());
        assert!(without.applied.is_empty());
        assert_eq!(without.cost, dec!(100));

        let owned: HashSet<String> = ["base".to_string()].into();
        let with = engine.adjust(&product, &groups, &owned);
        assert_eq!(with.applied, vec!["loyalty"]);
        assert_eq!(with.cost, dec!(90));
    }

    #[test]
    fn test_equal_priority_keeps_declaration_order() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine.upsert(spec("first", 5, RuleFlags::NONE, dec!(10)), &dir).unwrap();
        engine.upsert(spec("second", 5, RuleFlags::NONE, dec!(20)), &dir).unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();
        let adj = engine.adjust(&product, &groups, &HashSet::new());

        assert_eq!(adj.applied, vec!["first", "second"]);
    }

    #[test]
    fn test_block_purchase_marks_adjustment() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine
            .upsert(spec("gate", 9, RuleFlags::BLOCK_PURCHASE, dec!(0)), &dir)
            .unwrap();

        let product = dir.product_by_slug("svc").unwrap();
        let groups = dir.groups_for_product("svc").unwrap();
        let adj = engine.adjust(&product, &groups, &HashSet::new());

        assert!(adj.blocked);
    }

    #[test]
    fn test_remove_rule() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine.upsert(spec("a", 1, RuleFlags::NONE, dec!(10)), &dir).unwrap();

        engine.remove("a").unwrap();
        assert!(engine.rules().is_empty());
        assert!(matches!(engine.remove("a"), Err(RuleError::RuleNotFound(_))));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let dir = directory();
        let engine = RuleEngine::new();
        engine.upsert(spec("a", 5, RuleFlags::NONE, dec!(10)), &dir).unwrap();
        engine.upsert(spec("b", 5, RuleFlags::NONE, dec!(20)), &dir).unwrap();
        // Replacing "a" must not move it behind "b".
        engine.upsert(spec("a", 5, RuleFlags::NONE, dec!(15)), &dir).unwrap();

        let slugs: Vec<_> = engine.rules().into_iter().map(|r| r.slug).collect();
        assert_eq!(slugs, vec!["a", "b"]);
    }
}
