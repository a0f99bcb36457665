//! Runtime configuration read from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MOCK_PAYMENT_URL: &str = "http://localhost:8081";
const DEFAULT_RAZORPAY_API_URL: &str = "https://api.razorpay.com";
const DEFAULT_RAZORPAY_CURRENCY: &str = "INR";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaymentProvider {
    #[default]
    Mock,
    Razorpay,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Razorpay => "razorpay",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "razorpay" => Ok(Self::Razorpay),
            other => Err(format!("unknown payment provider {other:?} (expected mock or razorpay)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RazorpayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub api_url: String,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub payment_provider: PaymentProvider,
    pub webhook_secret: Option<String>,
    pub mock_payment_url: String,
    pub razorpay: RazorpayConfig,
    pub gateway_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let payment_provider = match get("PAYMENT_PROVIDER") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { key: "PAYMENT_PROVIDER", reason })?,
            None => PaymentProvider::default(),
        };
        let timeout_ms = match get("GATEWAY_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "GATEWAY_TIMEOUT_MS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_GATEWAY_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "GATEWAY_TIMEOUT_MS",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            payment_provider,
            webhook_secret: get("WEBHOOK_SECRET"),
            mock_payment_url: get("MOCK_PAYMENT_URL").unwrap_or_else(|| DEFAULT_MOCK_PAYMENT_URL.into()),
            razorpay: RazorpayConfig {
                key_id: get("RAZORPAY_KEY_ID"),
                key_secret: get("RAZORPAY_KEY_SECRET"),
                api_url: get("RAZORPAY_API_URL").unwrap_or_else(|| DEFAULT_RAZORPAY_API_URL.into()),
                currency: get("RAZORPAY_CURRENCY").unwrap_or_else(|| DEFAULT_RAZORPAY_CURRENCY.into()),
            },
            gateway_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.payment_provider, PaymentProvider::Mock);
        assert_eq!(cfg.mock_payment_url, "http://localhost:8081");
        assert_eq!(cfg.razorpay.currency, "INR");
        assert_eq!(cfg.gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("PAYMENT_PROVIDER", "RazorPay"),
            ("WEBHOOK_SECRET", "whsec"),
            ("DATABASE_URL", "  "),
            ("GATEWAY_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.payment_provider, PaymentProvider::Razorpay);
        assert_eq!(cfg.webhook_secret.as_deref(), Some("whsec"));
        assert_eq!(cfg.database_url, None); // Blank is unset
        assert_eq!(cfg.gateway_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { key: "PORT", .. })));
        assert!(matches!(config(&[("PAYMENT_PROVIDER", "stripe")]), Err(ConfigError::Invalid { key: "PAYMENT_PROVIDER", .. })));
        assert!(matches!(config(&[("GATEWAY_TIMEOUT_MS", "0")]), Err(ConfigError::Invalid { key: "GATEWAY_TIMEOUT_MS", .. })));
    }
}
