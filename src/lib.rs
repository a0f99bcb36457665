//! OpenSASE Checkout
//!
//! Cart, order and payment orchestration for self-hosted storefronts.
//!
//! ## Features
//! - Per-user carts validated against live inventory
//! - Order placement with atomic stock commitment
//! - Cancellation with stock restoration
//! - Pluggable payment providers (mock, Razorpay)
//! - Signed, idempotent payment webhooks

pub mod api;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod services;
pub mod store;

use rust_decimal::Decimal;
use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{CartError, OrderStateError, PaymentStateError, ProductError};
use crate::domain::value_objects::{Money, MoneyError, QuantityError};
use crate::gateway::webhook::{SignatureError, WebhookError};
use crate::gateway::GatewayError;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cart is empty. Cannot create order")]
    EmptyCart,

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Payment amount {actual} does not match order amount {expected}")]
    AmountMismatch { expected: Money, actual: Decimal },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment gateway failure: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<MoneyError> for CheckoutError {
    fn from(e: MoneyError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<QuantityError> for CheckoutError {
    fn from(e: QuantityError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<ProductError> for CheckoutError {
    fn from(e: ProductError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<OrderStateError> for CheckoutError {
    fn from(e: OrderStateError) -> Self {
        match e {
            OrderStateError::NoItems => Self::EmptyCart,
            OrderStateError::Total(money) => money.into(),
            other => Self::InvalidState(other.to_string()),
        }
    }
}

impl From<PaymentStateError> for CheckoutError {
    fn from(e: PaymentStateError) -> Self {
        Self::InvalidState(e.to_string())
    }
}

impl From<CartError> for CheckoutError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(product_id) => Self::not_found("Cart line", product_id),
            CartError::Quantity(q) => q.into(),
        }
    }
}

impl From<WebhookError> for CheckoutError {
    fn from(e: WebhookError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<SignatureError> for CheckoutError {
    fn from(e: SignatureError) -> Self {
        Self::Unauthorized(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
