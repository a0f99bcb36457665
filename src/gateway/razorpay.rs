//! Razorpay Orders API adapter.
//!
//! A checkout creates a Razorpay *order*; its id becomes the payment's
//! external reference. Webhooks carry that id as `payload.payment.entity.order_id`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::webhook::{SettlementKey, SignaturePolicy, WebhookError, WebhookEvent, WebhookIntake};
use super::{json_body, GatewayError, GatewayPayment, PaymentGateway};
use crate::config::PaymentProvider;
use crate::domain::aggregates::SettlementOutcome;
use crate::domain::value_objects::Money;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub struct RazorpayGateway {
    client: reqwest::Client,
    api_url: String,
    key_id: String,
    key_secret: String,
    currency: String,
}

impl RazorpayGateway {
    pub fn new(client: reqwest::Client, api_url: &str, key_id: String, key_secret: String, currency: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
            currency: currency.to_ascii_uppercase(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Razorpay
    }

    async fn create_payment(&self, order_id: Uuid, amount: Money) -> Result<GatewayPayment, GatewayError> {
        let minor = amount.to_minor_units().ok_or(GatewayError::UnsupportedAmount(amount))?;
        let response = self
            .client
            .post(format!("{}/v1/orders", self.api_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": minor,
                "currency": self.currency,
                "receipt": format!("order_receipt_{order_id}"),
                "notes": { "orderId": order_id.to_string() },
            }))
            .send()
            .await?;
        let body = json_body(response).await?;

        let rzp_order_id = body["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("Razorpay order without id: {body}")))?;
        Ok(GatewayPayment {
            external_reference: rzp_order_id,
            metadata: json!({ "keyId": self.key_id, "currency": self.currency, "amount": minor }),
        })
    }

    fn signature_policy(&self) -> SignaturePolicy {
        SignaturePolicy { header: SIGNATURE_HEADER, required: true }
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookIntake, WebhookError> {
        parse_webhook(body)
    }
}

#[derive(Deserialize)]
struct RazorpayWebhook {
    event: Option<String>,
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    payment: Option<PaymentWrapper>,
}

#[derive(Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: Option<String>,
    order_id: Option<String>,
}

pub fn parse_webhook(body: &[u8]) -> Result<WebhookIntake, WebhookError> {
    let hook: RazorpayWebhook = serde_json::from_slice(body)?;
    let event = hook.event.ok_or(WebhookError::MissingField("event"))?;
    let outcome = match event.as_str() {
        "payment.captured" => SettlementOutcome::Success,
        "payment.failed" => SettlementOutcome::Failed,
        _ => return Ok(WebhookIntake::Ignored { event }),
    };

    let entity = hook
        .payload
        .and_then(|p| p.payment)
        .map(|p| p.entity)
        .ok_or(WebhookError::MissingField("payload.payment.entity"))?;
    let rzp_order_id = entity.order_id.ok_or(WebhookError::MissingField("payload.payment.entity.order_id"))?;

    Ok(WebhookIntake::Settle(WebhookEvent {
        key: SettlementKey::ExternalReference(rzp_order_id),
        outcome,
        external_reference: entity.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(event: &str) -> String {
        format!(
            r#"{{"event":"{event}","payload":{{"payment":{{"entity":{{"id":"pay_A1","order_id":"order_Z9","status":"captured","amount":3000}}}}}}}}"#
        )
    }

    #[test]
    fn test_captured_and_failed_events() {
        let captured = parse_webhook(hook("payment.captured").as_bytes()).unwrap();
        assert_eq!(
            captured,
            WebhookIntake::Settle(WebhookEvent {
                key: SettlementKey::ExternalReference("order_Z9".into()),
                outcome: SettlementOutcome::Success,
                external_reference: Some("pay_A1".into()),
            })
        );

        let failed = parse_webhook(hook("payment.failed").as_bytes()).unwrap();
        assert!(matches!(failed, WebhookIntake::Settle(WebhookEvent { outcome: SettlementOutcome::Failed, .. })));
    }

    #[test]
    fn test_other_events_are_ignored() {
        assert_eq!(
            parse_webhook(hook("order.paid").as_bytes()).unwrap(),
            WebhookIntake::Ignored { event: "order.paid".into() }
        );
        assert_eq!(
            parse_webhook(br#"{"event":"payment.authorized"}"#).unwrap(),
            WebhookIntake::Ignored { event: "payment.authorized".into() }
        );
    }

    #[test]
    fn test_payment_event_without_order_id() {
        let body = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1"}}}}"#;
        assert!(matches!(parse_webhook(body), Err(WebhookError::MissingField(_))));
    }
}
