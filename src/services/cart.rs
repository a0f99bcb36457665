//! Cart manager: per-user selections checked against live stock.
//!
//! Stock checks here are advisory; nothing is reserved until an order is placed.
//! Writes that read the cart first hold the user's cart lock, so concurrent adds
//! for one user merge instead of overwriting each other.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartChange, CartError, CartLine, Product};
use crate::domain::value_objects::{Money, Quantity};
use crate::services::user_key;
use crate::store::{Store, StoreTx};
use crate::{CheckoutError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    /// `None` once the product has been deleted from the catalog.
    pub product: Option<ProductSnapshot>,
}

impl CartLineView {
    fn new(line: CartLine, product: Option<&Product>) -> Self {
        Self {
            id: line.id,
            product_id: line.product_id,
            quantity: line.quantity.value(),
            added_at: line.added_at,
            product: product.map(|p| ProductSnapshot { id: p.id, name: p.name.clone(), price: p.price }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub user_id: String,
    pub lines: Vec<CartLineView>,
    /// Sum over lines whose product still exists, at current prices.
    pub subtotal: Money,
}

#[derive(Clone)]
pub struct CartManager {
    store: Arc<dyn Store>,
}

impl CartManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Adds to the user's cart, merging with an existing line for the same product.
    pub async fn add_line(&self, user_id: &str, product_id: Uuid, quantity: u32) -> Result<CartLineView> {
        let user_id = user_key(user_id)?;
        let quantity = Quantity::new(quantity)?;

        let mut tx = self.store.begin().await?;
        tx.lock_cart(user_id).await?;
        let product = live_product(&mut tx, product_id, quantity).await?;

        let mut cart = Cart::new(user_id, tx.cart_lines(user_id).await?);
        let line = cart.add(product_id, quantity)?;
        tx.save_cart_line(&line).await?;
        tx.commit().await?;

        tracing::info!(user_id, product_id = %product_id, quantity = line.quantity.value(), "cart line saved");
        Ok(CartLineView::new(line, Some(&product)))
    }

    pub async fn cart(&self, user_id: &str) -> Result<CartView> {
        let user_id = user_key(user_id)?;
        let mut tx = self.store.begin().await?;
        let lines = tx.cart_lines(user_id).await?;

        let mut views = Vec::with_capacity(lines.len());
        let mut subtotal = Money::ZERO;
        for line in lines {
            let product = tx.product(line.product_id).await?;
            if let Some(p) = &product {
                subtotal = subtotal.checked_add(p.price.times(line.quantity)?)?;
            }
            views.push(CartLineView::new(line, product.as_ref()));
        }
        Ok(CartView { user_id: user_id.to_string(), lines: views, subtotal })
    }

    /// Idempotent. Returns how many lines were removed.
    pub async fn clear_cart(&self, user_id: &str) -> Result<u64> {
        let user_id = user_key(user_id)?;
        let mut tx = self.store.begin().await?;
        let removed = tx.clear_cart(user_id).await?;
        tx.commit().await?;
        tracing::info!(user_id, removed, "cart cleared");
        Ok(removed)
    }

    /// Sets a line's quantity. Zero removes the line and yields `None`.
    pub async fn set_line_quantity(&self, user_id: &str, product_id: Uuid, quantity: u32) -> Result<Option<CartLineView>> {
        let user_id = user_key(user_id)?;
        let mut tx = self.store.begin().await?;
        tx.lock_cart(user_id).await?;
        let mut cart = Cart::new(user_id, tx.cart_lines(user_id).await?);
        if cart.line(product_id).is_none() {
            return Err(CartError::ItemNotFound(product_id).into());
        }

        let view = match Quantity::new(quantity) {
            Ok(qty) => {
                let product = live_product(&mut tx, product_id, qty).await?;
                match cart.set_quantity(product_id, quantity)? {
                    CartChange::Updated(line) => {
                        tx.save_cart_line(&line).await?;
                        Some(CartLineView::new(line, Some(&product)))
                    }
                    CartChange::Removed => None,
                }
            }
            Err(_) => {
                cart.set_quantity(product_id, 0)?;
                tx.delete_cart_line(user_id, product_id).await?;
                None
            }
        };
        tx.commit().await?;

        tracing::info!(user_id, product_id = %product_id, quantity, "cart line quantity set");
        Ok(view)
    }

    pub async fn remove_line(&self, user_id: &str, product_id: Uuid) -> Result<()> {
        let user_id = user_key(user_id)?;
        let mut tx = self.store.begin().await?;
        if !tx.delete_cart_line(user_id, product_id).await? {
            return Err(CartError::ItemNotFound(product_id).into());
        }
        tx.commit().await?;
        tracing::info!(user_id, product_id = %product_id, "cart line removed");
        Ok(())
    }
}

/// Loads the product and checks `quantity` against its current stock.
async fn live_product(tx: &mut Box<dyn StoreTx>, product_id: Uuid, quantity: Quantity) -> Result<Product> {
    let product = tx
        .product(product_id)
        .await?
        .ok_or_else(|| CheckoutError::not_found("Product", product_id))?;
    if !product.has_stock_for(quantity) {
        return Err(CheckoutError::InsufficientStock {
            product_id,
            requested: quantity.value(),
            available: product.stock,
        });
    }
    Ok(product)
}
