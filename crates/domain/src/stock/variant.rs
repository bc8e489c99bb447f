//! Catalog references and the composite key inventory is tracked against.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Product identifier as supplied by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a color or size variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VariantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Composite key of a stock record: a product plus its optional color and
/// size axes.
///
/// An absent axis is a concrete value of its own. `(P1, None, None)` and
/// `(P1, Some(red), None)` are different keys and never match each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    product_id: ProductId,
    color_id: Option<VariantId>,
    size_id: Option<VariantId>,
}

impl VariantKey {
    /// Builds a key, rejecting blank references.
    pub fn new(
        product_id: impl Into<ProductId>,
        color_id: Option<VariantId>,
        size_id: Option<VariantId>,
    ) -> Result<Self, ValidationError> {
        let product_id = product_id.into();
        if product_id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyProductId);
        }
        let blank = |v: &Option<VariantId>| v.as_ref().is_some_and(|v| v.as_str().trim().is_empty());
        if blank(&color_id) || blank(&size_id) {
            return Err(ValidationError::EmptyVariantId);
        }
        Ok(Self {
            product_id,
            color_id,
            size_id,
        })
    }

    /// Key for a product that has no color or size axis.
    pub fn product(product_id: impl Into<ProductId>) -> Result<Self, ValidationError> {
        Self::new(product_id, None, None)
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn color_id(&self) -> Option<&VariantId> {
        self.color_id.as_ref()
    }

    pub fn size_id(&self) -> Option<&VariantId> {
        self.size_id.as_ref()
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let axis = |v: &Option<VariantId>| v.as_ref().map_or("-", |v| v.as_str()).to_string();
        write!(
            f,
            "{}/{}/{}",
            self.product_id,
            axis(&self.color_id),
            axis(&self.size_id)
        )
    }
}
