use crate::domain::aggregates::{CartLine, Order, OrderLine, OrderStatus, Payment, Product};
use crate::store::{StockAdjustment, Store, StoreResult, StoreTx};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default, Clone)]
struct Tables {
    products: HashMap<Uuid, Product>,
    cart_lines: HashMap<(String, Uuid), CartLine>,
    orders: HashMap<Uuid, Order>,
    order_lines: HashMap<Uuid, Vec<OrderLine>>,
    payments: HashMap<Uuid, Payment>,
}

/// A thread-safe in-memory store.
///
/// Transactions take the whole store lock and work on a copy of the tables,
/// so they are fully serialized and only become visible on commit.
/// Ideal for testing or local runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn products(&mut self) -> StoreResult<Vec<Product>> {
        let mut products: Vec<Product> = self.working.products.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete_product(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(self.working.products.remove(&id).is_some())
    }

    async fn adjust_stock(&mut self, id: Uuid, delta: i64) -> StoreResult<StockAdjustment> {
        let Some(product) = self.working.products.get_mut(&id) else {
            return Ok(StockAdjustment::Missing);
        };
        match u32::try_from(i64::from(product.stock) + delta) {
            Ok(stock) => {
                product.stock = stock;
                Ok(StockAdjustment::Adjusted { stock })
            }
            Err(_) => Ok(StockAdjustment::Insufficient { available: product.stock }),
        }
    }

    // Transactions are already serialized on the store lock.
    async fn lock_cart(&mut self, _user_id: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn cart_lines(&mut self, user_id: &str) -> StoreResult<Vec<CartLine>> {
        let mut lines: Vec<CartLine> = self
            .working
            .cart_lines
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.id.cmp(&b.id)));
        Ok(lines)
    }

    async fn save_cart_line(&mut self, line: &CartLine) -> StoreResult<()> {
        self.working
            .cart_lines
            .insert((line.user_id.clone(), line.product_id), line.clone());
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: &str, product_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .working
            .cart_lines
            .remove(&(user_id.to_string(), product_id))
            .is_some())
    }

    async fn clear_cart(&mut self, user_id: &str) -> StoreResult<u64> {
        let before = self.working.cart_lines.len();
        self.working.cart_lines.retain(|(owner, _), _| owner != user_id);
        Ok((before - self.working.cart_lines.len()) as u64)
    }

    async fn order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        self.order(id).await
    }

    async fn orders_for_user(&mut self, user_id: &str) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(orders)
    }

    async fn insert_order(&mut self, order: &Order, lines: &[OrderLine]) -> StoreResult<()> {
        self.working.orders.insert(order.id(), order.clone());
        self.working.order_lines.insert(order.id(), lines.to_vec());
        Ok(())
    }

    async fn order_lines(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        Ok(self
            .working
            .order_lines
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<()> {
        if let Some(order) = self.working.orders.get_mut(&id) {
            order.set_status(status);
        }
        Ok(())
    }

    async fn payment_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.order_id() == order_id)
            .cloned())
    }

    async fn payment_for_update(&mut self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        self.payment_for_order(order_id).await
    }

    async fn payment_by_reference(&mut self, reference: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.external_reference() == Some(reference))
            .cloned())
    }

    async fn save_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.working.payments.insert(payment.id(), payment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Money, Quantity};
    use rust_decimal_macros::dec;

    fn product(stock: u32) -> Product {
        Product::create("Widget", "", Money::new(dec!(10.0)).unwrap(), stock).unwrap()
    }

    #[tokio::test]
    async fn test_adjust_stock_never_goes_negative() {
        let store = InMemoryStore::new();
        let p = product(5);
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();

        assert_eq!(tx.adjust_stock(p.id, -3).await.unwrap(), StockAdjustment::Adjusted { stock: 2 });
        assert_eq!(tx.adjust_stock(p.id, -3).await.unwrap(), StockAdjustment::Insufficient { available: 2 });
        assert_eq!(tx.adjust_stock(p.id, 4).await.unwrap(), StockAdjustment::Adjusted { stock: 6 });
        assert_eq!(tx.adjust_stock(Uuid::new_v4(), 1).await.unwrap(), StockAdjustment::Missing);
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = InMemoryStore::new();
        let p = product(5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.adjust_stock(p.id, -5).await.unwrap();
        tx.save_cart_line(&CartLine::new("u1", p.id, Quantity::new(1).unwrap())).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.product(p.id).await.unwrap().unwrap().stock, 5);
        assert!(tx.cart_lines("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cart_lines_are_scoped_per_user() {
        let store = InMemoryStore::new();
        let p = product(5);
        let mut tx = store.begin().await.unwrap();
        tx.save_cart_line(&CartLine::new("u1", p.id, Quantity::new(1).unwrap())).await.unwrap();
        tx.save_cart_line(&CartLine::new("u2", p.id, Quantity::new(2).unwrap())).await.unwrap();

        assert_eq!(tx.clear_cart("u1").await.unwrap(), 1);
        assert_eq!(tx.clear_cart("u1").await.unwrap(), 0);
        assert_eq!(tx.cart_lines("u2").await.unwrap().len(), 1);
    }
}
