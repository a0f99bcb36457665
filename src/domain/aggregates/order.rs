//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, MoneyError, Quantity};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Created, Paid, Failed, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Created => "CREATED", Self::Paid => "PAID", Self::Failed => "FAILED", Self::Cancelled => "CANCELLED" }
    }
    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Created) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Ok(Self::Created),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status {other:?}")),
        }
    }
}

/// Price-snapshotted line of an order. Immutable once written.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Result<Money, MoneyError> { self.unit_price.times(self.quantity) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    id: Uuid,
    user_id: String,
    total: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a CREATED order from `(product_id, quantity, unit_price)` snapshots.
    pub fn place(user_id: impl Into<String>, items: impl IntoIterator<Item = (Uuid, Quantity, Money)>) -> Result<(Self, Vec<OrderLine>), OrderStateError> {
        let id = Uuid::now_v7();
        let lines: Vec<OrderLine> = items.into_iter()
            .map(|(product_id, quantity, unit_price)| OrderLine { id: Uuid::now_v7(), order_id: id, product_id, quantity, unit_price })
            .collect();
        if lines.is_empty() { return Err(OrderStateError::NoItems); }
        let total = lines.iter().try_fold(Money::ZERO, |acc, l| acc.checked_add(l.line_total()?))?;
        let order = Self { id, user_id: user_id.into(), total, status: OrderStatus::Created, created_at: Utc::now() };
        Ok((order, lines))
    }

    /// Rebuilds an order loaded from storage.
    pub fn restore(id: Uuid, user_id: String, total: Money, status: OrderStatus, created_at: DateTime<Utc>) -> Self {
        Self { id, user_id, total, status, created_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn total(&self) -> Money { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn ensure_cancellable(&self) -> Result<(), OrderStateError> {
        match self.status {
            OrderStatus::Created => Ok(()),
            OrderStatus::Paid => Err(OrderStateError::Paid),
            OrderStatus::Cancelled => Err(OrderStateError::AlreadyCancelled),
            OrderStatus::Failed => Err(OrderStateError::Failed),
        }
    }

    pub fn cancel(&mut self) -> Result<(), OrderStateError> {
        self.ensure_cancellable()?;
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Unchecked transition; callers own the decision.
    pub fn set_status(&mut self, status: OrderStatus) { self.status = status; }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderStateError {
    #[error("order has no items")]
    NoItems,
    #[error("a settled order cannot be cancelled")]
    Paid,
    #[error("order is already cancelled")]
    AlreadyCancelled,
    #[error("order payment failed; place a new order instead")]
    Failed,
    #[error("order total: {0}")]
    Total(#[from] MoneyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(qty: u32, price: rust_decimal::Decimal) -> (Uuid, Quantity, Money) {
        (Uuid::new_v4(), Quantity::new(qty).unwrap(), Money::new(price).unwrap())
    }

    #[test]
    fn test_place_snapshots_total() {
        let (order, lines) = Order::place("u1", [item(3, dec!(10.0)), item(2, dec!(2.50))]).unwrap();
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.total().amount(), dec!(35.0));
        assert!(lines.iter().all(|l| l.order_id == order.id()));
        let totals: Vec<Money> = lines.iter().map(|l| l.line_total().unwrap()).collect();
        assert_eq!(Money::total(totals).unwrap(), order.total());
    }

    #[test]
    fn test_place_refuses_unstorable_total() {
        let err = Order::place("u1", [item(2, dec!(9999999999)), item(1, dec!(1))]).unwrap_err();
        assert!(matches!(err, OrderStateError::Total(MoneyError::TooLarge(_))));
    }

    #[test]
    fn test_place_requires_items() {
        let none: Vec<(Uuid, Quantity, Money)> = Vec::new();
        assert_eq!(Order::place("u1", none).unwrap_err(), OrderStateError::NoItems);
    }

    #[test]
    fn test_cancel_rules() {
        let (mut order, _) = Order::place("u1", [item(1, dec!(1))]).unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel(), Err(OrderStateError::AlreadyCancelled));

        let (mut paid, _) = Order::place("u1", [item(1, dec!(1))]).unwrap();
        paid.set_status(OrderStatus::Paid);
        assert_eq!(paid.cancel(), Err(OrderStateError::Paid));
        assert_eq!(paid.status(), OrderStatus::Paid);
    }

    #[test]
    fn test_status_round_trip_text() {
        for s in [OrderStatus::Created, OrderStatus::Paid, OrderStatus::Failed, OrderStatus::Cancelled] {
            assert_eq!(s.to_string().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }
}
