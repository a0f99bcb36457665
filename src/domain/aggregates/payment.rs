//! Payment Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Pending, Success, Failed }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Success => "SUCCESS", Self::Failed => "FAILED" }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown payment status {other:?}")),
        }
    }
}

/// Terminal result reported by a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome { Success, Failed }

impl SettlementOutcome {
    pub fn payment_status(&self) -> PaymentStatus {
        match self { Self::Success => PaymentStatus::Success, Self::Failed => PaymentStatus::Failed }
    }
    pub fn order_status(&self) -> OrderStatus {
        match self { Self::Success => OrderStatus::Paid, Self::Failed => OrderStatus::Failed }
    }
}

impl FromStr for SettlementOutcome {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<PaymentStatus>()? {
            PaymentStatus::Success => Ok(Self::Success),
            PaymentStatus::Failed => Ok(Self::Failed),
            PaymentStatus::Pending => Err("PENDING is not a settlement outcome".to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement { Applied, AlreadyApplied }

#[derive(Clone, Debug, PartialEq)]
pub struct Payment {
    id: Uuid,
    order_id: Uuid,
    amount: Money,
    status: PaymentStatus,
    external_reference: Option<String>,
    settlement_reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl Payment {
    pub fn initiate(order_id: Uuid, amount: Money) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, amount, status: PaymentStatus::Pending,
            external_reference: None, settlement_reference: None, created_at: Utc::now(),
        }
    }

    /// Rebuilds a payment loaded from storage.
    pub fn restore(id: Uuid, order_id: Uuid, amount: Money, status: PaymentStatus, external_reference: Option<String>, settlement_reference: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self { id, order_id, amount, status, external_reference, settlement_reference, created_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn amount(&self) -> Money { self.amount }
    pub fn status(&self) -> PaymentStatus { self.status }
    pub fn external_reference(&self) -> Option<&str> { self.external_reference.as_deref() }
    pub fn settlement_reference(&self) -> Option<&str> { self.settlement_reference.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Stores the provider reference from payment creation. The first reference wins.
    pub fn attach_reference(&mut self, reference: impl Into<String>) -> bool {
        if self.external_reference.is_some() { return false; }
        self.external_reference = Some(reference.into());
        true
    }

    /// Applies a provider outcome. Re-applying the current outcome is a no-op.
    pub fn settle(&mut self, outcome: SettlementOutcome, reference: Option<String>) -> Result<Settlement, PaymentStateError> {
        let incoming = outcome.payment_status();
        match self.status {
            PaymentStatus::Pending => {
                self.status = incoming;
                if reference.is_some() { self.settlement_reference = reference; }
                Ok(Settlement::Applied)
            }
            current if current == incoming => Ok(Settlement::AlreadyApplied),
            current => Err(PaymentStateError::AlreadySettled { current, incoming }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentStateError {
    #[error("payment already settled as {current}, refusing {incoming}")]
    AlreadySettled { current: PaymentStatus, incoming: PaymentStatus },
}
