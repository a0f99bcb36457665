//! Cart Aggregate

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Quantity, QuantityError};

/// One product selection in a user's cart. Unique per (user_id, product_id).
#[derive(Clone, Debug, PartialEq)]
pub struct CartLine {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(user_id: impl Into<String>, product_id: Uuid, quantity: Quantity) -> Self {
        Self { id: Uuid::now_v7(), user_id: user_id.into(), product_id, quantity, added_at: Utc::now() }
    }
}

/// A user's pending selections, loaded in insertion order.
#[derive(Clone, Debug)]
pub struct Cart {
    user_id: String,
    lines: Vec<CartLine>,
}

/// Result of setting a line's quantity.
#[derive(Clone, Debug, PartialEq)]
pub enum CartChange {
    Updated(CartLine),
    Removed,
}

impl Cart {
    pub fn new(user_id: impl Into<String>, lines: Vec<CartLine>) -> Self {
        Self { user_id: user_id.into(), lines }
    }

    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, product_id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.product_id == product_id) }

    /// Adds `quantity` of a product, merging into an existing line. Returns the resulting line.
    pub fn add(&mut self, product_id: Uuid, quantity: Quantity) -> Result<CartLine, CartError> {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            existing.quantity = existing.quantity.checked_add(quantity)?;
            return Ok(existing.clone());
        }
        let line = CartLine::new(self.user_id.clone(), product_id, quantity);
        self.lines.push(line.clone());
        Ok(line)
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: u32) -> Result<CartChange, CartError> {
        let idx = self.lines.iter().position(|l| l.product_id == product_id).ok_or(CartError::ItemNotFound(product_id))?;
        if quantity == 0 {
            self.lines.remove(idx);
            return Ok(CartChange::Removed);
        }
        self.lines[idx].quantity = Quantity::new(quantity)?;
        Ok(CartChange::Updated(self.lines[idx].clone()))
    }

    pub fn remove(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before { return Err(CartError::ItemNotFound(product_id)); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("no cart line for product {0}")]
    ItemNotFound(Uuid),
    #[error(transparent)]
    Quantity(#[from] QuantityError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_cart_merges_repeated_adds() {
        let p1 = Uuid::new_v4();
        let mut cart = Cart::new("u1", vec![]);
        cart.add(p1, qty(2)).unwrap();
        let line = cart.add(p1, qty(1)).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(line.quantity.value(), 3); // Merged
        assert_eq!(cart.line(p1).unwrap().id, line.id);
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let p1 = Uuid::new_v4();
        let mut cart = Cart::new("u1", vec![]);
        cart.add(p1, qty(2)).unwrap();
        assert!(matches!(cart.set_quantity(p1, 5).unwrap(), CartChange::Updated(l) if l.quantity.value() == 5));
        assert_eq!(cart.set_quantity(p1, 0).unwrap(), CartChange::Removed);
        assert!(cart.is_empty());
        assert_eq!(cart.set_quantity(p1, 1), Err(CartError::ItemNotFound(p1)));
    }

    #[test]
    fn test_remove_missing_line() {
        let mut cart = Cart::new("u1", vec![]);
        let p1 = Uuid::new_v4();
        assert_eq!(cart.remove(p1), Err(CartError::ItemNotFound(p1)));
    }
}
