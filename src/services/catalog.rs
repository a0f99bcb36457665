use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::Product;
use crate::domain::value_objects::Money;
use crate::store::Store;
use crate::{CheckoutError, Result};

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for ProductView {
    fn from(p: Product) -> Self {
        Self { id: p.id, name: p.name, description: p.description, price: p.price, stock: p.stock, created_at: p.created_at }
    }
}

/// Product catalog (the inventory store's public face).
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_product(&self, input: NewProduct) -> Result<ProductView> {
        let price = Money::new(input.price)?;
        let product = Product::create(input.name, input.description, price, input.stock)?;

        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, name = %product.name, stock = product.stock, "product created");
        Ok(product.into())
    }

    pub async fn list_products(&self) -> Result<Vec<ProductView>> {
        let mut tx = self.store.begin().await?;
        let products = tx.products().await?;
        Ok(products.into_iter().map(ProductView::from).collect())
    }

    /// Blank queries list everything.
    pub async fn search_products(&self, query: &str) -> Result<Vec<ProductView>> {
        let needle = query.trim().to_lowercase();
        let mut tx = self.store.begin().await?;
        let products = tx.products().await?;
        Ok(products
            .into_iter()
            .filter(|p| needle.is_empty() || p.matches(&needle))
            .map(ProductView::from)
            .collect())
    }

    pub async fn product(&self, id: Uuid) -> Result<ProductView> {
        let mut tx = self.store.begin().await?;
        let product = tx.product(id).await?.ok_or_else(|| CheckoutError::not_found("Product", id))?;
        Ok(product.into())
    }

    /// Cart lines that reference the product are kept.
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_product(id).await? {
            return Err(CheckoutError::not_found("Product", id));
        }
        tx.commit().await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }
}
