//! Test utilities for integration tests.
//!
//! In-memory SQLite with every migration applied, an application state wired onto it and
//! helpers for driving the router without binding a port.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use migration::{Migrator, MigratorTrait};
use product_feeds::{
    config::AppConfig,
    models::connector::{self, ConnectorKind},
    server::{AppState, create_app},
    webhook_verification::sign_payload_base64,
};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;

pub const SHOPIFY_SECRET: &str = "shopify-test-secret";
pub const WOOCOMMERCE_SECRET: &str = "woocommerce-test-secret";
pub const SHOP_DOMAIN: &str = "demo.myshopify.com";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Development profile with webhook secrets set and near-zero delivery backoff.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        shopify_webhook_secret: Some(SHOPIFY_SECRET.to_string()),
        woocommerce_webhook_secret: Some(WOOCOMMERCE_SECRET.to_string()),
        ..AppConfig::default()
    };
    config.dispatch.backoff_unit_ms = 1;
    config.sync.retry_min_seconds = 0;
    config.sync.retry_max_seconds = 0;
    config
}

/// Application state over a fresh database.
#[allow(dead_code)]
pub async fn build_state(config: AppConfig) -> Result<AppState> {
    let db = setup_test_db().await?;
    AppState::build(Arc::new(config), db).await
}

#[allow(dead_code)]
pub async fn test_state() -> Result<AppState> {
    build_state(test_config()).await
}

#[allow(dead_code)]
pub fn router(state: &AppState) -> Router {
    create_app(state.clone())
}

/// Registers a connector without credentials, so it is active right away.
#[allow(dead_code)]
pub async fn register_connector(
    state: &AppState,
    kind: ConnectorKind,
    shop_domain: &str,
) -> Result<connector::Model> {
    Ok(state
        .ingest
        .register_connector(kind, shop_domain, Value::Null, None)
        .await?)
}

/// Sends one request through the router and returns the status and JSON body.
///
/// Non-JSON bodies come back as a JSON string.
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json)?)
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body)?).await?;
    read_json(response).await
}

#[allow(dead_code)]
pub async fn read_json(response: axum::response::Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}

/// Posts a Shopify webhook signed with `secret`.
#[allow(dead_code)]
pub async fn post_shopify_webhook(
    app: &Router,
    topic: &str,
    payload: &Value,
    secret: &str,
) -> Result<(StatusCode, Value)> {
    let body = serde_json::to_vec(payload)?;
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/webhooks/shopify/{topic}"))
        .header("content-type", "application/json")
        .header("X-Shopify-Hmac-Sha256", sign_payload_base64(secret, &body))
        .header("X-Shopify-Shop-Domain", SHOP_DOMAIN)
        .header("X-Shopify-Topic", topic)
        .body(Body::from(body))?;
    let response = app.clone().oneshot(request).await?;
    read_json(response).await
}

/// Shopify `products/create` payload with one tracked variant.
#[allow(dead_code)]
pub fn shopify_product(id: u64, title: &str, price: &str, quantity: i64) -> Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "body_html": format!("<p>{title}</p>"),
        "vendor": "Acme",
        "product_type": "Shirts",
        "handle": title.to_lowercase().replace(' ', "-"),
        "status": "active",
        "tags": "summer, cotton",
        "images": [{"src": format!("https://cdn.example/{id}.jpg")}],
        "variants": [{
            "id": id * 10 + 1,
            "price": price,
            "sku": format!("SKU-{id}"),
            "inventory_quantity": quantity,
            "inventory_management": "shopify",
            "inventory_item_id": id * 100 + 1
        }]
    })
}
