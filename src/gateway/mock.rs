//! Adapter for the bundled mock payment provider (`mock_provider` binary).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::webhook::{SettlementKey, SignaturePolicy, WebhookError, WebhookEvent, WebhookIntake};
use super::{json_body, GatewayError, GatewayPayment, PaymentGateway};
use crate::config::PaymentProvider;
use crate::domain::value_objects::Money;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub struct MockGateway {
    client: reqwest::Client,
    base_url: String,
}

impl MockGateway {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Mock
    }

    async fn create_payment(&self, order_id: Uuid, amount: Money) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .client
            .post(format!("{}/payments/create", self.base_url))
            .json(&json!({ "orderId": order_id, "amount": amount }))
            .send()
            .await?;
        let body = json_body(response).await?;

        let payment_id = body["paymentId"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("missing paymentId in {body}")))?;
        Ok(GatewayPayment { external_reference: payment_id, metadata: body })
    }

    fn signature_policy(&self) -> SignaturePolicy {
        SignaturePolicy { header: SIGNATURE_HEADER, required: false }
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookIntake, WebhookError> {
        parse_webhook(body)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockWebhook {
    order_id: Option<String>,
    payment_id: Option<String>,
    status: Option<String>,
}

/// Normalizes `{orderId, paymentId, status, amount}`; the payment is keyed by order id.
pub fn parse_webhook(body: &[u8]) -> Result<WebhookIntake, WebhookError> {
    let hook: MockWebhook = serde_json::from_slice(body)?;
    let raw_order_id = hook.order_id.ok_or(WebhookError::MissingField("orderId"))?;
    let order_id = Uuid::parse_str(raw_order_id.trim()).map_err(|_| WebhookError::InvalidOrderId(raw_order_id.clone()))?;
    let status = hook.status.ok_or(WebhookError::MissingField("status"))?;
    let outcome = status.parse().map_err(|_| WebhookError::UnknownStatus(status.clone()))?;

    Ok(WebhookIntake::Settle(WebhookEvent {
        key: SettlementKey::OrderId(order_id),
        outcome,
        external_reference: hook.payment_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::SettlementOutcome;

    #[test]
    fn test_parse_success_webhook() {
        let order_id = Uuid::new_v4();
        let body = format!(r#"{{"orderId":"{order_id}","paymentId":"pay_9","status":"SUCCESS","amount":30.0}}"#);
        let intake = parse_webhook(body.as_bytes()).unwrap();
        assert_eq!(
            intake,
            WebhookIntake::Settle(WebhookEvent {
                key: SettlementKey::OrderId(order_id),
                outcome: SettlementOutcome::Success,
                external_reference: Some("pay_9".into()),
            })
        );
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        assert!(matches!(parse_webhook(b"not json"), Err(WebhookError::Malformed(_))));
        assert!(matches!(parse_webhook(br#"{"status":"SUCCESS"}"#), Err(WebhookError::MissingField("orderId"))));
        assert!(matches!(
            parse_webhook(br#"{"orderId":"abc","status":"SUCCESS"}"#),
            Err(WebhookError::InvalidOrderId(_))
        ));
        let pending = format!(r#"{{"orderId":"{}","status":"PENDING"}}"#, Uuid::new_v4());
        assert!(matches!(parse_webhook(pending.as_bytes()), Err(WebhookError::UnknownStatus(_))));
    }
}
