#![allow(dead_code)]

use async_trait::async_trait;
use opensase_checkout::api::AppState;
use opensase_checkout::config::PaymentProvider;
use opensase_checkout::domain::value_objects::Money;
use opensase_checkout::gateway::webhook::{SignaturePolicy, WebhookError, WebhookIntake};
use opensase_checkout::gateway::{mock, GatewayError, GatewayPayment, PaymentGateway};
use opensase_checkout::services::NewProduct;
use opensase_checkout::store::{InMemoryStore, Store};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const GATEWAY_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail,
    Hang,
}

/// Gateway double: answers per the current script and counts calls.
/// Webhooks use the mock provider's shape.
pub struct ScriptedGateway {
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self { script: Mutex::new(Script::Succeed), calls: AtomicUsize::new(0) }
    }

    pub fn set(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Mock
    }

    async fn create_payment(&self, order_id: Uuid, amount: Money) -> Result<GatewayPayment, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let script = *self.script.lock().unwrap();
        match script {
            Script::Succeed => Ok(GatewayPayment {
                external_reference: format!("PAY_{n}_{}", order_id.simple()),
                metadata: json!({ "amount": amount }),
            }),
            Script::Fail => Err(GatewayError::Provider { status: 503, body: "unavailable".into() }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::InvalidResponse("woke up".into()))
            }
        }
    }

    fn signature_policy(&self) -> SignaturePolicy {
        SignaturePolicy { header: mock::SIGNATURE_HEADER, required: false }
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookIntake, WebhookError> {
        mock::parse_webhook(body)
    }
}

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<ScriptedGateway>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_secret(None)
    }

    pub fn with_secret(secret: Option<&str>) -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), secret)
    }

    pub fn with_store(store: Arc<dyn Store>, secret: Option<&str>) -> Self {
        let gateway = Arc::new(ScriptedGateway::new());
        let state = AppState::new(store.clone(), gateway.clone(), secret.map(String::from), GATEWAY_TIMEOUT);
        Self { store, gateway, state }
    }

    pub async fn product(&self, price: Decimal, stock: u32) -> Uuid {
        let input = NewProduct { name: "Widget".into(), description: "test product".into(), price, stock };
        self.state.catalog.create_product(input).await.unwrap().id
    }

    pub async fn stock(&self, product_id: Uuid) -> u32 {
        let mut tx = self.store.begin().await.unwrap();
        tx.product(product_id).await.unwrap().unwrap().stock
    }

    /// Changes stock behind the cart's back, as a concurrent order would.
    pub async fn adjust_stock(&self, product_id: Uuid, delta: i64) {
        let mut tx = self.store.begin().await.unwrap();
        tx.adjust_stock(product_id, delta).await.unwrap();
        tx.commit().await.unwrap();
    }

    /// Adds to the cart and places the order. Returns the order id.
    pub async fn place_order(&self, user_id: &str, product_id: Uuid, quantity: u32) -> Uuid {
        self.state.carts.add_line(user_id, product_id, quantity).await.unwrap();
        self.state.orders.create_order(user_id).await.unwrap().order.id
    }
}
