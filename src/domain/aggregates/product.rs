//! Product Aggregate

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};

/// Catalog entry. Stock only changes through the store's atomic adjust primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn create(name: impl Into<String>, description: impl Into<String>, price: Money, stock: u32) -> Result<Self, ProductError> {
        let name = name.into().trim().to_string();
        if name.is_empty() { return Err(ProductError::MissingName); }
        Ok(Self { id: Uuid::now_v7(), name, description: description.into(), price, stock, created_at: Utc::now() })
    }

    pub fn has_stock_for(&self, qty: Quantity) -> bool { self.stock >= qty.value() }

    /// Case-insensitive match on name or description; `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.description.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("product name is required")]
    MissingName,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_product_create() {
        let p = Product::create("  Widget ", "Blue", Money::new(dec!(19.99)).unwrap(), 4).unwrap();
        assert_eq!(p.name, "Widget");
        assert!(p.has_stock_for(Quantity::new(4).unwrap()));
        assert!(!p.has_stock_for(Quantity::new(5).unwrap()));
    }

    #[test]
    fn test_product_requires_name() {
        assert_eq!(Product::create(" ", "", Money::ZERO, 0), Err(ProductError::MissingName));
    }

    #[test]
    fn test_matches() {
        let p = Product::create("Coffee Mug", "Ceramic, 350ml", Money::ZERO, 1).unwrap();
        assert!(p.matches("mug"));
        assert!(p.matches("ceramic"));
        assert!(!p.matches("glass"));
    }
}
