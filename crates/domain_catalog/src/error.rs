//! Catalog domain errors

use thiserror::Error;

/// Errors that can occur in the catalog domain
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Unknown product slug or id
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Unknown group slug
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Slug already taken by an active product
    #[error("Duplicate product slug: {0}")]
    DuplicateSlug(String),

    /// Malformed product definition
    #[error("Validation error: {0}")]
    Validation(String),
}
