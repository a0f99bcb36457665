//! Order engine.
//!
//! Placing an order re-validates the cart against live stock, snapshots prices,
//! decrements stock and clears the cart in one transaction, holding the user's
//! cart lock so a double-submitted checkout yields one order. Cancelling restores
//! stock through the same compare-and-adjust primitive.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderLine, OrderStatus, Payment, PaymentStatus};
use crate::domain::value_objects::{Money, MoneyError};
use crate::services::user_key;
use crate::store::{StockAdjustment, Store, StoreResult, StoreTx};
use crate::{CheckoutError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub user_id: String,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(o: &Order) -> Self {
        Self { id: o.id(), user_id: o.user_id().to_string(), total: o.total(), status: o.status(), created_at: o.created_at() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl TryFrom<&OrderLine> for OrderLineView {
    type Error = MoneyError;
    fn try_from(l: &OrderLine) -> std::result::Result<Self, MoneyError> {
        Ok(Self { id: l.id, product_id: l.product_id, quantity: l.quantity.value(), unit_price: l.unit_price, line_total: l.line_total()? })
    }
}

fn line_views(lines: &[OrderLine]) -> Result<Vec<OrderLineView>> {
    lines.iter().map(|l| OrderLineView::try_from(l).map_err(CheckoutError::from)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: Money,
    pub external_reference: Option<String>,
}

impl From<&Payment> for PaymentSummary {
    fn from(p: &Payment) -> Self {
        Self { id: p.id(), status: p.status(), amount: p.amount(), external_reference: p.external_reference().map(String::from) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub items: Vec<OrderLineView>,
    pub payment: Option<PaymentSummary>,
}

#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn Store>,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Turns the user's cart into a CREATED order.
    pub async fn create_order(&self, user_id: &str) -> Result<OrderDetails> {
        let user_id = user_key(user_id)?;
        let mut tx = self.store.begin().await?;
        tx.lock_cart(user_id).await?;
        let cart = tx.cart_lines(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut items = Vec::with_capacity(cart.len());
        for line in &cart {
            let product = tx
                .product(line.product_id)
                .await?
                .ok_or_else(|| CheckoutError::not_found("Product", line.product_id))?;
            if !product.has_stock_for(line.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity.value(),
                    available: product.stock,
                });
            }
            items.push((product.id, line.quantity, product.price));
        }

        let (order, lines) = Order::place(user_id, items)?;
        tx.insert_order(&order, &lines).await?;
        for line in &lines {
            // Re-checked by the store; a concurrent order may have taken the stock.
            match tx.adjust_stock(line.product_id, -line.quantity.as_delta()).await? {
                StockAdjustment::Adjusted { .. } => {}
                StockAdjustment::Insufficient { available } => {
                    return Err(CheckoutError::InsufficientStock {
                        product_id: line.product_id,
                        requested: line.quantity.value(),
                        available,
                    });
                }
                StockAdjustment::Missing => return Err(CheckoutError::not_found("Product", line.product_id)),
            }
        }
        let cleared = tx.clear_cart(user_id).await?;
        if cleared != cart.len() as u64 {
            tracing::warn!(user_id, read = cart.len(), cleared, "cart changed during checkout");
            return Err(CheckoutError::InvalidState(format!("cart of user {user_id} changed during checkout")));
        }
        tx.commit().await?;

        tracing::info!(order_id = %order.id(), user_id, total = %order.total(), items = lines.len(), "order created");
        Ok(OrderDetails { order: (&order).into(), items: line_views(&lines)?, payment: None })
    }

    /// Sets the status without transition checks. Used by payment settlement.
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<OrderSummary> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.order_for_update(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        record_status(&mut tx, &mut order, status).await?;
        tx.commit().await?;
        Ok((&order).into())
    }

    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderSummary> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.order_for_update(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        order.cancel()?;

        for line in tx.order_lines(order_id).await? {
            match tx.adjust_stock(line.product_id, line.quantity.as_delta()).await? {
                StockAdjustment::Adjusted { stock } => {
                    tracing::debug!(order_id = %order_id, product_id = %line.product_id, stock, "stock restored");
                }
                StockAdjustment::Missing => {
                    tracing::warn!(order_id = %order_id, product_id = %line.product_id, "product gone, stock not restored");
                }
                StockAdjustment::Insufficient { available } => {
                    tracing::warn!(order_id = %order_id, product_id = %line.product_id, available, "stock restore refused");
                }
            }
        }
        tx.update_order_status(order_id, OrderStatus::Cancelled).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order_id, "order cancelled");
        Ok((&order).into())
    }

    pub async fn order_details(&self, order_id: Uuid) -> Result<OrderDetails> {
        let mut tx = self.store.begin().await?;
        let order = tx.order(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        let lines = tx.order_lines(order_id).await?;
        let payment = tx.payment_for_order(order_id).await?;
        Ok(OrderDetails {
            order: (&order).into(),
            items: line_views(&lines)?,
            payment: payment.as_ref().map(PaymentSummary::from),
        })
    }

    /// Newest first.
    pub async fn order_history(&self, user_id: &str) -> Result<Vec<OrderSummary>> {
        let user_id = user_key(user_id)?;
        let mut tx = self.store.begin().await?;
        let orders = tx.orders_for_user(user_id).await?;
        Ok(orders.iter().map(OrderSummary::from).collect())
    }
}

/// Writes a status change inside an open transaction.
pub(crate) async fn record_status(tx: &mut Box<dyn StoreTx>, order: &mut Order, status: OrderStatus) -> StoreResult<()> {
    let from = order.status();
    order.set_status(status);
    tx.update_order_status(order.id(), status).await?;
    tracing::info!(order_id = %order.id(), %from, to = %status, "order status updated");
    Ok(())
}
