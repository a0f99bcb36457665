//! HTTP surface.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::gateway::PaymentGateway;
use crate::services::{
    CartLineView, CartManager, CartView, Catalog, NewProduct, OrderDetails, OrderEngine, OrderSummary, PaymentInitiated,
    PaymentReconciler, ProductView, WebhookOutcome,
};
use crate::store::Store;
use crate::{CheckoutError, Result};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub carts: CartManager,
    pub orders: OrderEngine,
    pub payments: PaymentReconciler,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, webhook_secret: Option<String>, gateway_timeout: Duration) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            carts: CartManager::new(store.clone()),
            orders: OrderEngine::new(store.clone()),
            payments: PaymentReconciler::new(store, gateway, webhook_secret, gateway_timeout),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "opensase-checkout"})) }))
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/search", get(search_products))
        .route("/api/products/:id", get(get_product).delete(delete_product))
        .route("/api/cart/add", post(add_to_cart))
        .route("/api/cart/:user_id", get(get_cart))
        .route("/api/cart/:user_id/clear", delete(clear_cart))
        .route("/api/cart/:user_id/items/:product_id", put(set_cart_quantity).delete(remove_cart_line))
        .route("/api/orders", post(create_order))
        .route("/api/orders/user/:user_id", get(order_history))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/cancel", post(cancel_order))
        .route("/api/payments/create", post(create_payment))
        .route("/api/webhooks/payment", post(payment_webhook))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

impl CheckoutError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::EmptyCart | Self::Validation(_) | Self::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({"status": "error", "message": self.to_string()}))).into_response()
    }
}

fn validate(req: &impl Validate) -> Result<()> {
    req.validate().map_err(|e| CheckoutError::Validation(e.to_string()))
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

async fn create_product(State(s): State<AppState>, Json(r): Json<CreateProductRequest>) -> Result<(StatusCode, Json<ProductView>)> {
    validate(&r)?;
    let product = s
        .catalog
        .create_product(NewProduct { name: r.name, description: r.description.unwrap_or_default(), price: r.price, stock: r.stock })
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products(State(s): State<AppState>) -> Result<Json<Vec<ProductView>>> {
    Ok(Json(s.catalog.list_products().await?))
}

async fn search_products(State(s): State<AppState>, Query(p): Query<SearchParams>) -> Result<Json<Vec<ProductView>>> {
    Ok(Json(s.catalog.search_products(p.q.as_deref().unwrap_or_default()).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductView>> {
    Ok(Json(s.catalog.product(id).await?))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

async fn add_to_cart(State(s): State<AppState>, Json(r): Json<AddToCartRequest>) -> Result<Json<CartLineView>> {
    validate(&r)?;
    Ok(Json(s.carts.add_line(&r.user_id, r.product_id, r.quantity).await?))
}

async fn get_cart(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<Json<CartView>> {
    Ok(Json(s.carts.cart(&user_id).await?))
}

async fn clear_cart(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<StatusCode> {
    s.carts.clear_cart(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_cart_quantity(
    State(s): State<AppState>,
    Path((user_id, product_id)): Path<(String, Uuid)>,
    Json(r): Json<SetQuantityRequest>,
) -> Result<Response> {
    Ok(match s.carts.set_line_quantity(&user_id, product_id, r.quantity).await? {
        Some(line) => Json(line).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn remove_cart_line(State(s): State<AppState>, Path((user_id, product_id)): Path<(String, Uuid)>) -> Result<StatusCode> {
    s.carts.remove_line(&user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
}

async fn create_order(State(s): State<AppState>, Json(r): Json<CreateOrderRequest>) -> Result<(StatusCode, Json<OrderDetails>)> {
    validate(&r)?;
    Ok((StatusCode::CREATED, Json(s.orders.create_order(&r.user_id).await?)))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderDetails>> {
    Ok(Json(s.orders.order_details(id).await?))
}

async fn order_history(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<Json<Vec<OrderSummary>>> {
    Ok(Json(s.orders.order_history(&user_id).await?))
}

async fn cancel_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderSummary>> {
    Ok(Json(s.orders.cancel_order(id).await?))
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
}

async fn create_payment(State(s): State<AppState>, Json(r): Json<CreatePaymentRequest>) -> Result<Json<PaymentInitiated>> {
    Ok(Json(s.payments.initiate_payment(r.order_id, r.amount).await?))
}

/// Takes the raw body: signatures are computed over the exact bytes received.
async fn payment_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookOutcome>> {
    let signature = headers.get(s.payments.signature_header()).and_then(|v| v.to_str().ok());
    Ok(Json(s.payments.handle_webhook(signature, &body).await?))
}
