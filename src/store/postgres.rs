use crate::domain::aggregates::{CartLine, Order, OrderLine, OrderStatus, Payment, PaymentStatus, Product};
use crate::domain::value_objects::{Money, Quantity};
use crate::store::{StockAdjustment, Store, StoreError, StoreResult, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::migrate::MigrateError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed store. Each [`StoreTx`] is one database transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow { id: Uuid, name: String, description: String, price: Decimal, stock: i32, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct CartLineRow { id: Uuid, user_id: String, product_id: Uuid, quantity: i32, added_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRow { id: Uuid, user_id: String, total_amount: Decimal, status: String, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderLineRow { id: Uuid, order_id: Uuid, product_id: Uuid, quantity: i32, unit_price: Decimal }

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid, order_id: Uuid, amount: Decimal, status: String,
    external_reference: Option<String>, settlement_reference: Option<String>, created_at: DateTime<Utc>,
}

fn corrupt(what: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(what.to_string())
}

fn money(value: Decimal) -> StoreResult<Money> { Money::new(value).map_err(corrupt) }

fn quantity(value: i32) -> StoreResult<Quantity> {
    let value = u32::try_from(value).map_err(corrupt)?;
    Quantity::new(value).map_err(corrupt)
}

fn to_i32(value: impl TryInto<i32>, what: &str) -> StoreResult<i32> {
    value.try_into().map_err(|_| corrupt(format!("{what} out of range")))
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        Ok(Product { id: r.id, name: r.name, description: r.description, price: money(r.price)?, stock: u32::try_from(r.stock).map_err(corrupt)?, created_at: r.created_at })
    }
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = StoreError;
    fn try_from(r: CartLineRow) -> StoreResult<Self> {
        Ok(CartLine { id: r.id, user_id: r.user_id, product_id: r.product_id, quantity: quantity(r.quantity)?, added_at: r.added_at })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> StoreResult<Self> {
        let status = r.status.parse::<OrderStatus>().map_err(corrupt)?;
        Ok(Order::restore(r.id, r.user_id, money(r.total_amount)?, status, r.created_at))
    }
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = StoreError;
    fn try_from(r: OrderLineRow) -> StoreResult<Self> {
        Ok(OrderLine { id: r.id, order_id: r.order_id, product_id: r.product_id, quantity: quantity(r.quantity)?, unit_price: money(r.unit_price)? })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;
    fn try_from(r: PaymentRow) -> StoreResult<Self> {
        let status = r.status.parse::<PaymentStatus>().map_err(corrupt)?;
        Ok(Payment::restore(r.id, r.order_id, money(r.amount)?, status, r.external_reference, r.settlement_reference, r.created_at))
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, created_at";
const CART_COLUMNS: &str = "id, user_id, product_id, quantity, added_at";
const ORDER_COLUMNS: &str = "id, user_id, total_amount, status, created_at";
const PAYMENT_COLUMNS: &str = "id, order_id, amount, status, external_reference, settlement_reference, created_at";

#[async_trait]
impl StoreTx for PostgresTx {
    async fn product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(Product::try_from).transpose()
    }

    async fn products(&mut self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC"))
            .fetch_all(&mut *self.tx).await?;
        convert_all(rows)
    }

    async fn insert_product(&mut self, p: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, name, description, price, stock, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, NOW())")
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.price.amount()).bind(to_i32(p.stock, "stock")?).bind(p.created_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn delete_product(&mut self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_stock(&mut self, id: Uuid, delta: i64) -> StoreResult<StockAdjustment> {
        let delta = to_i32(delta, "stock delta")?;
        let adjusted: Option<(i32,)> = sqlx::query_as("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 AND stock + $2 >= 0 RETURNING stock")
            .bind(id).bind(delta).fetch_optional(&mut *self.tx).await?;
        if let Some((stock,)) = adjusted {
            return Ok(StockAdjustment::Adjusted { stock: u32::try_from(stock).map_err(corrupt)? });
        }
        let current: Option<(i32,)> = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
            .bind(id).fetch_optional(&mut *self.tx).await?;
        Ok(match current {
            Some((available,)) => StockAdjustment::Insufficient { available: u32::try_from(available).map_err(corrupt)? },
            None => StockAdjustment::Missing,
        })
    }

    async fn lock_cart(&mut self, user_id: &str) -> StoreResult<()> {
        // Transaction-scoped; also covers carts that have no rows yet.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('cart:' || $1))")
            .bind(user_id).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn cart_lines(&mut self, user_id: &str) -> StoreResult<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLineRow>(&format!("SELECT {CART_COLUMNS} FROM cart_lines WHERE user_id = $1 ORDER BY added_at, id"))
            .bind(user_id).fetch_all(&mut *self.tx).await?;
        convert_all(rows)
    }

    async fn save_cart_line(&mut self, l: &CartLine) -> StoreResult<()> {
        sqlx::query("INSERT INTO cart_lines (id, user_id, product_id, quantity, added_at) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity")
            .bind(l.id).bind(&l.user_id).bind(l.product_id).bind(to_i32(l.quantity.value(), "quantity")?).bind(l.added_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: &str, product_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, user_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = $1").bind(user_id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(Order::try_from).transpose()
    }

    async fn order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(Order::try_from).transpose()
    }

    async fn orders_for_user(&mut self, user_id: &str) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"))
            .bind(user_id).fetch_all(&mut *self.tx).await?;
        convert_all(rows)
    }

    async fn insert_order(&mut self, order: &Order, lines: &[OrderLine]) -> StoreResult<()> {
        sqlx::query("INSERT INTO orders (id, user_id, total_amount, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, NOW())")
            .bind(order.id()).bind(order.user_id()).bind(order.total().amount()).bind(order.status().as_str()).bind(order.created_at())
            .execute(&mut *self.tx).await?;
        for l in lines {
            sqlx::query("INSERT INTO order_lines (id, order_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4, $5)")
                .bind(l.id).bind(l.order_id).bind(l.product_id).bind(to_i32(l.quantity.value(), "quantity")?).bind(l.unit_price.amount())
                .execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn order_lines(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>("SELECT id, order_id, product_id, quantity, unit_price FROM order_lines WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&mut *self.tx).await?;
        convert_all(rows)
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id).bind(status.as_str()).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn payment_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"))
            .bind(order_id).fetch_optional(&mut *self.tx).await?;
        row.map(Payment::try_from).transpose()
    }

    async fn payment_for_update(&mut self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 FOR UPDATE"))
            .bind(order_id).fetch_optional(&mut *self.tx).await?;
        row.map(Payment::try_from).transpose()
    }

    async fn payment_by_reference(&mut self, reference: &str) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_reference = $1"))
            .bind(reference).fetch_optional(&mut *self.tx).await?;
        row.map(Payment::try_from).transpose()
    }

    async fn save_payment(&mut self, p: &Payment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, order_id, amount, status, external_reference, settlement_reference, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, external_reference = EXCLUDED.external_reference, \
             settlement_reference = EXCLUDED.settlement_reference, updated_at = NOW()",
        )
        .bind(p.id()).bind(p.order_id()).bind(p.amount().amount()).bind(p.status().as_str())
        .bind(p.external_reference()).bind(p.settlement_reference()).bind(p.created_at())
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PostgresTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
