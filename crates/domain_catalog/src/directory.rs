//! Group Directory
//!
//! The directory is the explicitly constructed, injected catalog cache: it
//! owns all products and groups, guards them with a read-write lock, and
//! answers the membership queries the rule engine and the ledger depend on.
//!
//! Traversal rules, kept as documented methods rather than ad-hoc joins:
//! - `groups_for_product`: every group a product belongs to, starting with
//!   its implicit self-named group.
//! - `products_for_group`: the members of a group in registration order.
//! - `representative_product`: the member whose own slug equals the group
//!   slug. Bundle extension extends representatives, which is what lets one
//!   purchase extend several bundled services at once.

use std::collections::HashMap;
use std::sync::RwLock;

use core_kernel::ProductId;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::CatalogError;
use crate::flags::ProductFlags;
use crate::group::Group;
use crate::product::Product;

#[derive(Debug, Default)]
struct DirectoryState {
    products: HashMap<ProductId, Product>,
    by_slug: HashMap<String, ProductId>,
    groups: HashMap<String, Group>,
    /// group slug -> member products, registration order
    members: HashMap<String, Vec<ProductId>>,
    /// product -> group slugs, self-named group first
    groups_of: HashMap<ProductId, Vec<String>>,
}

/// Thread-safe directory of products and groups
#[derive(Debug, Default)]
pub struct GroupDirectory {
    inner: RwLock<DirectoryState>,
}

impl GroupDirectory {
    /// Creates an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a product, creating its implicit self-named group.
    ///
    /// # Errors
    ///
    /// - `DuplicateSlug` if an active product already uses the slug
    /// - `Validation` if the slug is empty or the cost is negative
    pub fn register(&self, product: Product) -> Result<ProductId, CatalogError> {
        if product.slug.trim().is_empty() {
            return Err(CatalogError::Validation("product slug is empty".into()));
        }
        if product.cost < Decimal::ZERO {
            return Err(CatalogError::Validation(format!(
                "product {} has negative cost",
                product.slug
            )));
        }

        let mut state = self.inner.write().expect("directory lock poisoned");
        if state.by_slug.contains_key(&product.slug) {
            return Err(CatalogError::DuplicateSlug(product.slug));
        }

        let id = product.id;
        let slug = product.slug.clone();
        state.by_slug.insert(slug.clone(), id);
        state.products.insert(id, product);
        Self::join_group(&mut state, id, &slug);

        debug!(product = %slug, "registered product");
        Ok(id)
    }

    /// Adds a product to a group, creating the group when missing.
    pub fn add_to_group(&self, product_slug: &str, group_slug: &str) -> Result<(), CatalogError> {
        let mut state = self.inner.write().expect("directory lock poisoned");
        let id = *state
            .by_slug
            .get(product_slug)
            .ok_or_else(|| CatalogError::ProductNotFound(product_slug.to_string()))?;
        Self::join_group(&mut state, id, group_slug);
        Ok(())
    }

    /// Supersedes the product at `slug` with `replacement`.
    ///
    /// The old row is renamed to a disambiguated slug and flagged `DISABLED`;
    /// its identifier and group memberships are untouched so historical
    /// ledger entries keep resolving. The replacement takes over the original
    /// slug (and with it, the representative position of the self-named
    /// group).
    pub fn supersede(
        &self,
        slug: &str,
        mut replacement: Product,
    ) -> Result<ProductId, CatalogError> {
        let mut state = self.inner.write().expect("directory lock poisoned");
        let old_id = *state
            .by_slug
            .get(slug)
            .ok_or_else(|| CatalogError::ProductNotFound(slug.to_string()))?;

        let retired_slug = {
            let old = state.products.get_mut(&old_id).expect("slug index out of sync");
            let simple = old.id.as_uuid().simple().to_string();
            old.slug = format!("{slug}--{}", &simple[..8]);
            old.flags.insert(ProductFlags::DISABLED);
            old.slug.clone()
        };
        state.by_slug.remove(slug);
        state.by_slug.insert(retired_slug.clone(), old_id);

        replacement.slug = slug.to_string();
        let new_id = replacement.id;
        state.by_slug.insert(slug.to_string(), new_id);
        state.products.insert(new_id, replacement);
        Self::join_group(&mut state, new_id, slug);

        debug!(product = %slug, retired = %retired_slug, "superseded product");
        Ok(new_id)
    }

    /// Looks up a product by its slug
    pub fn product_by_slug(&self, slug: &str) -> Result<Product, CatalogError> {
        let state = self.inner.read().expect("directory lock poisoned");
        state
            .by_slug
            .get(slug)
            .and_then(|id| state.products.get(id))
            .cloned()
            .ok_or_else(|| CatalogError::ProductNotFound(slug.to_string()))
    }

    /// Looks up a product by its identifier
    pub fn product_by_id(&self, id: ProductId) -> Result<Product, CatalogError> {
        let state = self.inner.read().expect("directory lock poisoned");
        state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::ProductNotFound(id.to_string()))
    }

    /// Returns true if a group with this slug exists
    pub fn group_exists(&self, slug: &str) -> bool {
        let state = self.inner.read().expect("directory lock poisoned");
        state.groups.contains_key(slug)
    }

    /// Returns the group slugs a product belongs to, self-named group first
    pub fn groups_for_product(&self, product_slug: &str) -> Result<Vec<String>, CatalogError> {
        let state = self.inner.read().expect("directory lock poisoned");
        let id = state
            .by_slug
            .get(product_slug)
            .ok_or_else(|| CatalogError::ProductNotFound(product_slug.to_string()))?;
        Ok(state.groups_of.get(id).cloned().unwrap_or_default())
    }

    /// Returns the group slugs a product belongs to, by product id
    pub fn groups_for_product_id(&self, id: ProductId) -> Vec<String> {
        let state = self.inner.read().expect("directory lock poisoned");
        state.groups_of.get(&id).cloned().unwrap_or_default()
    }

    /// Returns the member products of a group in registration order
    pub fn products_for_group(&self, group_slug: &str) -> Result<Vec<Product>, CatalogError> {
        let state = self.inner.read().expect("directory lock poisoned");
        let members = state
            .members
            .get(group_slug)
            .ok_or_else(|| CatalogError::GroupNotFound(group_slug.to_string()))?;
        Ok(members
            .iter()
            .filter_map(|id| state.products.get(id))
            .cloned()
            .collect())
    }

    /// Returns the representative product of a group: the member whose own
    /// slug equals the group slug.
    pub fn representative_product(&self, group_slug: &str) -> Option<Product> {
        let state = self.inner.read().expect("directory lock poisoned");
        state
            .members
            .get(group_slug)?
            .iter()
            .filter_map(|id| state.products.get(id))
            .find(|p| p.slug == group_slug)
            .cloned()
    }

    fn join_group(state: &mut DirectoryState, id: ProductId, group_slug: &str) {
        state
            .groups
            .entry(group_slug.to_string())
            .or_insert_with(|| Group::new(group_slug));
        let members = state.members.entry(group_slug.to_string()).or_default();
        if !members.contains(&id) {
            members.push(id);
        }
        let groups = state.groups_of.entry(id).or_default();
        if !groups.iter().any(|g| g == group_slug) {
            groups.push(group_slug.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn directory_with_bundle() -> GroupDirectory {
        let dir = GroupDirectory::new();
        dir.register(Product::service("alpha", dec!(5), 60)).unwrap();
        dir.register(Product::service("beta", dec!(8), 120)).unwrap();
        dir.add_to_group("alpha", "bundle").unwrap();
        dir.add_to_group("beta", "bundle").unwrap();
        dir
    }

    #[test]
    fn test_register_creates_self_group() {
        let dir = GroupDirectory::new();
        dir.register(Product::service("alpha", dec!(5), 60)).unwrap();

        assert!(dir.group_exists("alpha"));
        assert_eq!(dir.groups_for_product("alpha").unwrap(), vec!["alpha"]);
        let rep = dir.representative_product("alpha").unwrap();
        assert_eq!(rep.slug, "alpha");
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let dir = GroupDirectory::new();
        dir.register(Product::service("alpha", dec!(5), 60)).unwrap();
        let err = dir.register(Product::service("alpha", dec!(9), 30));
        assert!(matches!(err, Err(CatalogError::DuplicateSlug(_))));
    }

    #[test]
    fn test_bundle_membership() {
        let dir = directory_with_bundle();

        let groups = dir.groups_for_product("alpha").unwrap();
        assert_eq!(groups, vec!["alpha", "bundle"]);

        let members = dir.products_for_group("bundle").unwrap();
        let slugs: Vec<_> = members.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_bundle_group_has_no_representative_without_own_product() {
        let dir = directory_with_bundle();
        // No product is named "bundle", so the group has no representative.
        assert!(dir.representative_product("bundle").is_none());
    }

    #[test]
    fn test_supersede_renames_and_disables_old_row() {
        let dir = directory_with_bundle();
        let old = dir.product_by_slug("alpha").unwrap();

        let new_id = dir
            .supersede("alpha", Product::service("alpha", dec!(7), 90))
            .unwrap();

        let replacement = dir.product_by_slug("alpha").unwrap();
        assert_eq!(replacement.id, new_id);
        assert_eq!(replacement.cost, dec!(7));

        let retired = dir.product_by_id(old.id).unwrap();
        assert!(retired.is_disabled());
        assert_ne!(retired.slug, "alpha");
        assert!(retired.slug.starts_with("alpha--"));

        // The replacement is now the representative of the self-named group.
        assert_eq!(dir.representative_product("alpha").unwrap().id, new_id);
    }

    #[test]
    fn test_unknown_lookups() {
        let dir = GroupDirectory::new();
        assert!(matches!(
            dir.product_by_slug("nope"),
            Err(CatalogError::ProductNotFound(_))
        ));
        assert!(matches!(
            dir.products_for_group("nope"),
            Err(CatalogError::GroupNotFound(_))
        ));
    }
}
