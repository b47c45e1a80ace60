//! Product groups
//!
//! A group is a named set of products. Rules target groups, and bundle
//! extension walks a purchased product's groups to find what else to extend.

use serde::{Deserialize, Serialize};

use core_kernel::GroupId;

/// A named set of products
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier
    pub id: GroupId,
    /// Unique group name; a product's implicit group shares its slug
    pub slug: String,
}

impl Group {
    /// Creates a new group
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            slug: slug.into(),
        }
    }
}
