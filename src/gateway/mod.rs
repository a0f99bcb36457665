//! Payment provider adapters.
//!
//! Exactly one [`PaymentGateway`] is active per process, chosen by
//! `PAYMENT_PROVIDER`. Each adapter creates payments with its provider and
//! owns that provider's webhook shape.

pub mod mock;
pub mod razorpay;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, ConfigError, PaymentProvider};
use crate::domain::value_objects::Money;
use webhook::{SignaturePolicy, WebhookError, WebhookIntake};

pub use mock::MockGateway;
pub use razorpay::RazorpayGateway;

/// What a provider hands back when a payment is created.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPayment {
    pub external_reference: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider responded with {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("amount {0} cannot be expressed in minor units")]
    UnsupportedAmount(Money),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn create_payment(&self, order_id: Uuid, amount: Money) -> Result<GatewayPayment, GatewayError>;

    fn signature_policy(&self) -> SignaturePolicy;

    /// Normalizes a raw webhook body. Call only after the signature was checked.
    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookIntake, WebhookError>;
}

/// Builds the adapter selected by configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let client = reqwest::Client::new();
    let gateway: Arc<dyn PaymentGateway> = match config.payment_provider {
        PaymentProvider::Mock => Arc::new(MockGateway::new(client, &config.mock_payment_url)),
        PaymentProvider::Razorpay => {
            let rz = &config.razorpay;
            let key_id = rz.key_id.clone().ok_or(ConfigError::Missing("RAZORPAY_KEY_ID"))?;
            let key_secret = rz.key_secret.clone().ok_or(ConfigError::Missing("RAZORPAY_KEY_SECRET"))?;
            Arc::new(RazorpayGateway::new(client, &rz.api_url, key_id, key_secret, &rz.currency))
        }
    };
    tracing::info!(provider = %gateway.provider(), "payment gateway configured");
    Ok(gateway)
}

/// Reads the response body as JSON, turning non-2xx replies into [`GatewayError::Provider`].
pub(crate) async fn json_body(response: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Provider { status: status.as_u16(), body });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_from_config_selects_provider() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(from_config(&cfg).unwrap().provider(), PaymentProvider::Mock);

        let cfg = Config::from_lookup(lookup(&[
            ("PAYMENT_PROVIDER", "razorpay"),
            ("RAZORPAY_KEY_ID", "rzp_test_1"),
            ("RAZORPAY_KEY_SECRET", "shh"),
        ]))
        .unwrap();
        let gateway = from_config(&cfg).unwrap();
        assert_eq!(gateway.provider(), PaymentProvider::Razorpay);
        assert!(gateway.signature_policy().required);
    }

    #[test]
    fn test_razorpay_requires_credentials() {
        let cfg = Config::from_lookup(lookup(&[("PAYMENT_PROVIDER", "razorpay")])).unwrap();
        assert_eq!(from_config(&cfg).err(), Some(ConfigError::Missing("RAZORPAY_KEY_ID")));
    }
}
