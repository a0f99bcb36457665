//! Mock payment provider.
//!
//! Accepts `POST /payments/create`, answers PENDING right away, then reports
//! the outcome to the checkout webhook after a delay. Deliveries are signed
//! with `WEBHOOK_SECRET` when it is set.

use anyhow::Result;
use axum::{extract::State, routing::post, Json, Router};
use opensase_checkout::domain::aggregates::SettlementOutcome;
use opensase_checkout::gateway::{mock::SIGNATURE_HEADER, webhook};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

struct Settings {
    webhook_url: String,
    webhook_secret: Option<String>,
    delay: Duration,
    outcome: SettlementOutcome,
}

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentCreateRequest {
    order_id: String,
    amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentCreateResponse {
    payment_id: String,
    order_id: String,
    amount: Decimal,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest {
    order_id: String,
    payment_id: String,
    status: SettlementOutcome,
    amount: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    let delay_ms = env("MOCK_PAYMENT_DELAY_MS").map(|v| v.parse::<u64>()).transpose()?.unwrap_or(3000);
    let outcome = match env("MOCK_PAYMENT_OUTCOME") {
        Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
        None => SettlementOutcome::Success,
    };
    let settings = Settings {
        webhook_url: env("PAYMENT_WEBHOOK_URL").unwrap_or_else(|| "http://localhost:8080/api/webhooks/payment".into()),
        webhook_secret: env("WEBHOOK_SECRET"),
        delay: Duration::from_millis(delay_ms),
        outcome,
    };
    let state = AppState { settings: Arc::new(settings), client: reqwest::Client::new() };

    let app = Router::new()
        .route("/payments/create", post(create_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = env("MOCK_PROVIDER_PORT").unwrap_or_else(|| "8081".to_string());
    tracing::info!("Mock payment provider listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

async fn create_payment(State(s): State<AppState>, Json(r): Json<PaymentCreateRequest>) -> Json<PaymentCreateResponse> {
    let payment_id = format!("PAY_{}", Uuid::new_v4().simple());
    tracing::info!(order_id = %r.order_id, payment_id = %payment_id, amount = %r.amount, "payment accepted");

    let hook = WebhookRequest {
        order_id: r.order_id.clone(),
        payment_id: payment_id.clone(),
        status: s.settings.outcome,
        amount: r.amount,
    };
    tokio::spawn(deliver(s.clone(), hook));

    Json(PaymentCreateResponse { payment_id, order_id: r.order_id, amount: r.amount, status: "PENDING" })
}

async fn deliver(s: AppState, hook: WebhookRequest) {
    tokio::time::sleep(s.settings.delay).await;

    let body = match serde_json::to_vec(&hook) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode webhook");
            return;
        }
    };
    let mut request = s
        .client
        .post(s.settings.webhook_url.as_str())
        .header(reqwest::header::CONTENT_TYPE, "application/json");
    if let Some(secret) = &s.settings.webhook_secret {
        match webhook::sign(secret, &body) {
            Ok(signature) => request = request.header(SIGNATURE_HEADER, signature),
            Err(e) => {
                tracing::error!(error = %e, "failed to sign webhook");
                return;
            }
        }
    }

    match request.body(body).send().await {
        Ok(resp) => tracing::info!(order_id = %hook.order_id, status = %resp.status(), "webhook delivered"),
        Err(e) => tracing::error!(order_id = %hook.order_id, error = %e, "webhook delivery failed"),
    }
}
