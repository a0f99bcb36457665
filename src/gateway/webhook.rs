//! Webhook intake: signature checks and the canonical settlement event.
//!
//! Signatures are hex-encoded HMAC-SHA256 over the raw request body.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::SettlementOutcome;

type HmacSha256 = Hmac<Sha256>;

/// How a payment is located when its webhook arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementKey {
    OrderId(Uuid),
    ExternalReference(String),
}

/// Provider-independent settlement notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub key: SettlementKey,
    pub outcome: SettlementOutcome,
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookIntake {
    Settle(WebhookEvent),
    /// Authentic delivery that carries no settlement (e.g. `order.paid` notifications).
    Ignored { event: String },
}

/// Per-provider signing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignaturePolicy {
    /// Lowercase header name carrying the signature.
    pub header: &'static str,
    /// Whether unsigned deliveries are refused even when no secret is configured.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing webhook signature")]
    Missing,
    #[error("invalid webhook signature")]
    Invalid,
    #[error("webhook secret is not configured for a provider that signs its webhooks")]
    SecretNotConfigured,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("webhook payload is missing {0}")]
    MissingField(&'static str),
    #[error("webhook carries an invalid order id: {0}")]
    InvalidOrderId(String),
    #[error("webhook carries an unknown status: {0}")]
    UnknownStatus(String),
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Gates webhook trust. A configured secret always requires a valid signature.
pub fn authenticate(policy: SignaturePolicy, secret: Option<&str>, signature: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
    match (secret, signature) {
        (Some(secret), Some(signature)) if verify(secret, body, signature) => Ok(()),
        (Some(_), Some(_)) => Err(SignatureError::Invalid),
        (Some(_), None) => Err(SignatureError::Missing),
        (None, _) if policy.required => Err(SignatureError::SecretNotConfigured),
        (None, _) => {
            tracing::warn!(header = policy.header, "accepting unsigned webhook: no secret configured");
            Ok(())
        }
    }
}
