//! Aggregates module
pub mod cart;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::{Cart, CartChange, CartError, CartLine};
pub use order::{Order, OrderLine, OrderStateError, OrderStatus};
pub use payment::{Payment, PaymentStateError, PaymentStatus, Settlement, SettlementOutcome};
pub use product::{Product, ProductError};
