//! Persistence ports.
//!
//! Every read and write goes through a [`StoreTx`] obtained from [`Store::begin`].
//! A transaction applies nothing until [`StoreTx::commit`]; dropping it rolls back.
//! Stock is only ever changed through [`StoreTx::adjust_stock`], which checks and
//! applies a delta as one step so concurrent orders cannot drive stock negative.
//!
//! Lock order: a user's cart lock, then product rows; an order row, then its
//! payment row. Plain reads take no locks.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{CartLine, Order, OrderLine, OrderStatus, Payment, Product};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a compare-and-adjust on a product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    Adjusted { stock: u32 },
    Insufficient { available: u32 },
    Missing,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn product(&mut self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Newest first.
    async fn products(&mut self) -> StoreResult<Vec<Product>>;
    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;
    async fn delete_product(&mut self, id: Uuid) -> StoreResult<bool>;
    /// Applies `delta` to stock only if the result stays non-negative.
    async fn adjust_stock(&mut self, id: Uuid, delta: i64) -> StoreResult<StockAdjustment>;

    /// Serializes read-modify-write work on `user_id`'s cart until the transaction ends.
    async fn lock_cart(&mut self, user_id: &str) -> StoreResult<()>;
    /// Oldest first.
    async fn cart_lines(&mut self, user_id: &str) -> StoreResult<Vec<CartLine>>;
    /// Inserts or replaces the line for `(user_id, product_id)`.
    async fn save_cart_line(&mut self, line: &CartLine) -> StoreResult<()>;
    async fn delete_cart_line(&mut self, user_id: &str, product_id: Uuid) -> StoreResult<bool>;
    async fn clear_cart(&mut self, user_id: &str) -> StoreResult<u64>;

    async fn order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Like [`StoreTx::order`], and locks the row for the rest of the transaction.
    async fn order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Newest first.
    async fn orders_for_user(&mut self, user_id: &str) -> StoreResult<Vec<Order>>;
    async fn insert_order(&mut self, order: &Order, lines: &[OrderLine]) -> StoreResult<()>;
    async fn order_lines(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderLine>>;
    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<()>;

    async fn payment_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<Payment>>;
    /// Like [`StoreTx::payment_for_order`], and locks the row. Take the order's lock first.
    async fn payment_for_update(&mut self, order_id: Uuid) -> StoreResult<Option<Payment>>;
    /// Looks up by the provider reference stored at creation.
    async fn payment_by_reference(&mut self, reference: &str) -> StoreResult<Option<Payment>>;
    /// Inserts or replaces by payment id.
    async fn save_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
