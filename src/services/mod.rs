//! Application services.
//!
//! Each service owns a handle to the [`Store`](crate::store::Store) and runs
//! every operation inside a single store transaction. Responses are explicit
//! view structs serialized in camelCase.

pub mod cart;
pub mod catalog;
pub mod orders;
pub mod payments;

pub use cart::{CartLineView, CartManager, CartView, ProductSnapshot};
pub use catalog::{Catalog, NewProduct, ProductView};
pub use orders::{OrderDetails, OrderEngine, OrderLineView, OrderSummary, PaymentSummary};
pub use payments::{PaymentInitiated, PaymentReconciler, SettlementReceipt, WebhookOutcome};

use crate::{CheckoutError, Result};

/// Canonical form of a user id: surrounding whitespace removed, never empty.
/// Every cart and order operation keys by this form.
pub(crate) fn user_key(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(CheckoutError::Validation("userId is required".into()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key() {
        assert_eq!(user_key(" u1 ").unwrap(), "u1");
        assert_eq!(user_key("u1").unwrap(), "u1");
        assert!(matches!(user_key(" \t"), Err(CheckoutError::Validation(_))));
    }
}
