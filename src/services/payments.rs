//! Payment reconciler.
//!
//! Initiation commits a PENDING payment before calling the provider, so a
//! provider failure leaves a payment that a retry can pick up. The provider
//! call itself runs outside any store transaction and is bounded by a timeout.
//! Settlement is idempotent: replaying the recorded outcome changes nothing,
//! and a conflicting outcome is refused. Both paths lock the order row before
//! the payment row.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, Payment, PaymentStatus, Settlement, SettlementOutcome};
use crate::domain::value_objects::Money;
use crate::gateway::webhook::{self, SettlementKey, WebhookIntake};
use crate::gateway::{GatewayError, GatewayPayment, PaymentGateway};
use crate::services::orders::record_status;
use crate::store::Store;
use crate::{CheckoutError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiated {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub external_reference: String,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Provider data the client needs to complete checkout. `null` when an
    /// earlier attempt already obtained the reference.
    pub provider_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// False when the outcome had already been recorded.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum WebhookOutcome {
    Settled(SettlementReceipt),
    Ignored { event: String },
}

#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: Option<String>,
    gateway_timeout: Duration,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, webhook_secret: Option<String>, gateway_timeout: Duration) -> Self {
        Self { store, gateway, webhook_secret, gateway_timeout }
    }

    /// Header the active provider signs webhooks in.
    pub fn signature_header(&self) -> &'static str {
        self.gateway.signature_policy().header
    }

    pub async fn initiate_payment(&self, order_id: Uuid, amount: Decimal) -> Result<PaymentInitiated> {
        let mut tx = self.store.begin().await?;
        let order = tx.order_for_update(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        if order.status() != OrderStatus::Created {
            return Err(CheckoutError::InvalidState(format!("order {order_id} is {}, expected CREATED", order.status())));
        }
        if amount != order.total().amount() {
            return Err(CheckoutError::AmountMismatch { expected: order.total(), actual: amount });
        }

        let payment = match tx.payment_for_update(order_id).await? {
            Some(existing) if existing.status() != PaymentStatus::Pending => {
                return Err(CheckoutError::InvalidState(format!(
                    "payment {} for order {order_id} is already {}",
                    existing.id(),
                    existing.status()
                )));
            }
            Some(existing) => {
                if let Some(reference) = existing.external_reference() {
                    tracing::info!(order_id = %order_id, payment_id = %existing.id(), reference, "payment already initiated");
                    return Ok(initiated(&existing, reference.to_string(), serde_json::Value::Null));
                }
                tracing::info!(order_id = %order_id, payment_id = %existing.id(), "retrying payment initiation");
                existing
            }
            None => {
                let payment = Payment::initiate(order_id, order.total());
                tx.save_payment(&payment).await?;
                payment
            }
        };
        tx.commit().await?;

        let created = match self.call_gateway(order_id, payment.amount()).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(order_id = %order_id, payment_id = %payment.id(), error = %e, "payment provider call failed");
                return Err(e.into());
            }
        };

        let mut tx = self.store.begin().await?;
        let mut stored = tx
            .payment_for_update(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Payment", payment.id()))?;
        if !stored.attach_reference(created.external_reference.clone()) {
            tracing::warn!(
                payment_id = %stored.id(),
                kept = stored.external_reference().unwrap_or_default(),
                discarded = %created.external_reference,
                "payment already carries a provider reference"
            );
        }
        tx.save_payment(&stored).await?;
        tx.commit().await?;

        let reference = stored.external_reference().unwrap_or(&created.external_reference).to_string();
        tracing::info!(
            order_id = %order_id,
            payment_id = %stored.id(),
            provider = %self.gateway.provider(),
            reference = %reference,
            amount = %stored.amount(),
            "payment initiated"
        );
        Ok(initiated(&stored, reference, created.metadata))
    }

    async fn call_gateway(&self, order_id: Uuid, amount: Money) -> std::result::Result<GatewayPayment, GatewayError> {
        tokio::time::timeout(self.gateway_timeout, self.gateway.create_payment(order_id, amount))
            .await
            .map_err(|_| GatewayError::Timeout(self.gateway_timeout))?
    }

    /// Records a provider outcome and moves the order to PAID or FAILED.
    pub async fn settle_payment(&self, key: SettlementKey, outcome: SettlementOutcome, reference: Option<String>) -> Result<SettlementReceipt> {
        let missing = || match &key {
            SettlementKey::OrderId(order_id) => CheckoutError::not_found("Payment for order", order_id),
            SettlementKey::ExternalReference(r) => CheckoutError::not_found("Payment with reference", r),
        };

        let mut tx = self.store.begin().await?;
        let order_id = match &key {
            SettlementKey::OrderId(order_id) => *order_id,
            SettlementKey::ExternalReference(r) => tx.payment_by_reference(r).await?.ok_or_else(missing)?.order_id(),
        };
        let mut order = tx.order_for_update(order_id).await?.ok_or_else(missing)?;
        let mut payment = tx.payment_for_update(order_id).await?.ok_or_else(missing)?;

        let settlement = match payment.settle(outcome, reference) {
            Ok(settlement) => settlement,
            Err(e) => {
                tracing::warn!(payment_id = %payment.id(), order_id = %order_id, error = %e, "conflicting settlement refused");
                return Err(e.into());
            }
        };
        if settlement == Settlement::AlreadyApplied {
            tracing::info!(payment_id = %payment.id(), order_id = %order_id, status = %payment.status(), "settlement already recorded");
            return Ok(receipt(&payment, order.status(), false));
        }

        tx.save_payment(&payment).await?;
        if order.status() == OrderStatus::Created {
            record_status(&mut tx, &mut order, outcome.order_status()).await?;
        } else {
            tracing::warn!(
                order_id = %order_id,
                order_status = %order.status(),
                payment_status = %payment.status(),
                "payment settled for an order that is no longer open; order left unchanged"
            );
        }
        tx.commit().await?;

        tracing::info!(payment_id = %payment.id(), order_id = %order_id, status = %payment.status(), "payment settled");
        Ok(receipt(&payment, order.status(), true))
    }

    /// Verifies, normalizes and settles a raw provider webhook.
    pub async fn handle_webhook(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookOutcome> {
        let policy = self.gateway.signature_policy();
        if let Err(e) = webhook::authenticate(policy, self.webhook_secret.as_deref(), signature, body) {
            tracing::warn!(provider = %self.gateway.provider(), error = %e, "webhook rejected");
            return Err(e.into());
        }

        match self.gateway.parse_webhook(body)? {
            WebhookIntake::Settle(event) => {
                let receipt = self.settle_payment(event.key, event.outcome, event.external_reference).await?;
                Ok(WebhookOutcome::Settled(receipt))
            }
            WebhookIntake::Ignored { event } => {
                tracing::info!(provider = %self.gateway.provider(), event = %event, "webhook ignored");
                Ok(WebhookOutcome::Ignored { event })
            }
        }
    }
}

fn initiated(payment: &Payment, external_reference: String, provider_metadata: serde_json::Value) -> PaymentInitiated {
    PaymentInitiated {
        payment_id: payment.id(),
        order_id: payment.order_id(),
        external_reference,
        amount: payment.amount(),
        status: payment.status(),
        provider_metadata,
    }
}

fn receipt(payment: &Payment, order_status: OrderStatus, applied: bool) -> SettlementReceipt {
    SettlementReceipt {
        payment_id: payment.id(),
        order_id: payment.order_id(),
        payment_status: payment.status(),
        order_status,
        applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentProvider;
    use crate::domain::aggregates::Order;
    use crate::domain::value_objects::Quantity;
    use crate::gateway::mock;
    use crate::gateway::webhook::{SignaturePolicy, WebhookError};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every create with `ref_<order id>`.
    #[derive(Default)]
    struct FixedGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        fn provider(&self) -> PaymentProvider {
            PaymentProvider::Mock
        }

        async fn create_payment(&self, order_id: Uuid, _amount: Money) -> std::result::Result<GatewayPayment, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GatewayPayment { external_reference: format!("ref_{order_id}"), metadata: serde_json::json!({}) })
        }

        fn signature_policy(&self) -> SignaturePolicy {
            SignaturePolicy { header: mock::SIGNATURE_HEADER, required: false }
        }

        fn parse_webhook(&self, body: &[u8]) -> std::result::Result<WebhookIntake, WebhookError> {
            mock::parse_webhook(body)
        }
    }

    /// A CREATED order for 3 x 10.00, stored directly.
    async fn setup() -> (PaymentReconciler, Arc<InMemoryStore>, Arc<FixedGateway>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(FixedGateway::default());
        let (order, lines) =
            Order::place("u1", [(Uuid::new_v4(), Quantity::new(3).unwrap(), Money::new(dec!(10.00)).unwrap())]).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order, &lines).await.unwrap();
        tx.commit().await.unwrap();

        let reconciler = PaymentReconciler::new(store.clone(), gateway.clone(), None, Duration::from_secs(1));
        (reconciler, store, gateway, order.id())
    }

    async fn order_status(store: &InMemoryStore, order_id: Uuid) -> OrderStatus {
        store.begin().await.unwrap().order(order_id).await.unwrap().unwrap().status()
    }

    #[tokio::test]
    async fn test_amount_mismatch_creates_no_payment() {
        let (payments, store, gateway, order_id) = setup().await;
        let err = payments.initiate_payment(order_id, dec!(29.99)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::AmountMismatch { .. }));
        assert!(store.begin().await.unwrap().payment_for_order(order_id).await.unwrap().is_none());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);

        // Numeric comparison; scale does not matter.
        let initiated = payments.initiate_payment(order_id, dec!(30)).await.unwrap();
        assert_eq!(initiated.external_reference, format!("ref_{order_id}"));
    }

    #[tokio::test]
    async fn test_replayed_outcome_is_not_reapplied() {
        let (payments, store, _, order_id) = setup().await;
        payments.initiate_payment(order_id, dec!(30.00)).await.unwrap();

        let key = SettlementKey::OrderId(order_id);
        let first = payments.settle_payment(key.clone(), SettlementOutcome::Success, Some("PAY_1".into())).await.unwrap();
        assert!(first.applied);
        let again = payments.settle_payment(key.clone(), SettlementOutcome::Success, Some("PAY_1".into())).await.unwrap();
        assert!(!again.applied);
        assert_eq!(again.order_status, OrderStatus::Paid);

        let conflict = payments.settle_payment(key, SettlementOutcome::Failed, None).await;
        assert!(matches!(conflict, Err(CheckoutError::InvalidState(_))));
        assert_eq!(order_status(&store, order_id).await, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_settle_by_reference_resolves_order() {
        let (payments, store, _, order_id) = setup().await;
        payments.initiate_payment(order_id, dec!(30.00)).await.unwrap();

        let receipt = payments
            .settle_payment(SettlementKey::ExternalReference(format!("ref_{order_id}")), SettlementOutcome::Failed, None)
            .await
            .unwrap();
        assert_eq!(receipt.order_id, order_id);
        assert_eq!(receipt.payment_status, PaymentStatus::Failed);
        assert_eq!(order_status(&store, order_id).await, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_settle_without_payment_is_not_found() {
        let (payments, store, _, order_id) = setup().await;
        let err = payments.settle_payment(SettlementKey::OrderId(order_id), SettlementOutcome::Success, None).await;
        assert!(matches!(err, Err(CheckoutError::NotFound { .. })));
        assert_eq!(order_status(&store, order_id).await, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_settlement_leaves_closed_order_alone() {
        let (payments, store, _, order_id) = setup().await;
        payments.initiate_payment(order_id, dec!(30.00)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_order_status(order_id, OrderStatus::Cancelled).await.unwrap();
        tx.commit().await.unwrap();

        let receipt = payments.settle_payment(SettlementKey::OrderId(order_id), SettlementOutcome::Success, None).await.unwrap();
        assert!(receipt.applied);
        assert_eq!(receipt.payment_status, PaymentStatus::Success);
        assert_eq!(receipt.order_status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_initiate_after_settlement_refused() {
        let (payments, _, gateway, order_id) = setup().await;
        payments.initiate_payment(order_id, dec!(30.00)).await.unwrap();
        payments.settle_payment(SettlementKey::OrderId(order_id), SettlementOutcome::Success, None).await.unwrap();

        let err = payments.initiate_payment(order_id, dec!(30.00)).await;
        assert!(matches!(err, Err(CheckoutError::InvalidState(_))));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }
}
