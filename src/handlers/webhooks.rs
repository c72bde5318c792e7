//! # Inbound Webhook Handlers
//!
//! Product and inventory events pushed by Shopify and WooCommerce. The signature is checked
//! against the raw body before anything is parsed or stored.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ingest::service::ApplyOutcome;
use crate::models::connector::ConnectorKind;
use crate::server::AppState;
use crate::webhook_verification::{WebhookSource, verify_webhook_signature};

pub const SHOPIFY_SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
pub const SHOPIFY_TOPIC_HEADER: &str = "x-shopify-topic";
pub const WOOCOMMERCE_TOPIC_HEADER: &str = "x-wc-webhook-topic";

/// Shopify webhook route parameters
#[derive(Debug, Deserialize, IntoParams)]
pub struct ShopifyWebhookPath {
    /// `products`, `inventory_levels` or `app`
    #[param(example = "products")]
    pub resource: String,
    /// `create`, `update`, `delete` or `uninstalled`
    #[param(example = "update")]
    pub action: String,
}

/// Webhook accept response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// `processed` or `ignored`
    pub status: String,
    /// What the event changed
    pub outcome: String,
    /// Product written by an upsert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
}

impl From<ApplyOutcome> for WebhookAcceptResponse {
    fn from(outcome: ApplyOutcome) -> Self {
        let (status, outcome, product_id) = match outcome {
            ApplyOutcome::Upserted(product) => ("processed", "product_upserted".to_string(), Some(product.id)),
            ApplyOutcome::Deleted { found } => (
                "processed",
                if found { "product_deactivated" } else { "product_unknown" }.to_string(),
                None,
            ),
            ApplyOutcome::InventoryApplied { variants_updated } => (
                "processed",
                format!("inventory_applied:{variants_updated}"),
                None,
            ),
            ApplyOutcome::ConnectorDeactivated { products } => (
                "processed",
                format!("connector_deactivated:{products}"),
                None,
            ),
            ApplyOutcome::Ignored => ("ignored", "ignored".to_string(), None),
        };
        Self {
            status: status.to_string(),
            outcome,
            product_id,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Receives a Shopify product, inventory or uninstall event
#[utoipa::path(
    post,
    path = "/webhooks/shopify/{resource}/{action}",
    params(
        ShopifyWebhookPath,
        ("X-Shopify-Hmac-Sha256" = String, Header, description = "Base64 HMAC-SHA256 of the body"),
        ("X-Shopify-Shop-Domain" = String, Header, description = "Shop the event belongs to"),
        ("X-Shopify-Topic" = Option<String>, Header, description = "Event topic; defaults to the path")
    ),
    request_body(content = serde_json::Value, description = "Shopify webhook payload"),
    responses(
        (status = 200, description = "Event applied", body = WebhookAcceptResponse),
        (status = 400, description = "Malformed payload or missing shop domain", body = ApiError),
        (status = 401, description = "Signature rejected", body = ApiError),
        (status = 404, description = "No connector for the shop", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn shopify_webhook(
    State(state): State<AppState>,
    Path(path): Path<ShopifyWebhookPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAcceptResponse>, ApiError> {
    verify_webhook_signature(WebhookSource::Shopify, &body, &headers, &state.config)?;

    let shop_domain = header_str(&headers, SHOPIFY_SHOP_DOMAIN_HEADER).ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "BAD_PAYLOAD",
            "missing X-Shopify-Shop-Domain header",
        )
    })?;
    let topic = header_str(&headers, SHOPIFY_TOPIC_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/{}", path.resource, path.action));

    let connector = state
        .ingest
        .connector_for_domain(ConnectorKind::Shopify, shop_domain)
        .await?;
    debug!(connector_id = %connector.id, topic = %topic, "Shopify webhook accepted");

    let outcome = state
        .ingest
        .handle_webhook(&connector, &topic, &body)
        .await?;
    info!(connector_id = %connector.id, topic = %topic, "Shopify webhook processed");
    Ok(Json(outcome.into()))
}

/// Receives a WooCommerce product event for one connector
#[utoipa::path(
    post,
    path = "/webhooks/woocommerce/{connector_id}",
    params(
        ("connector_id" = Uuid, Path, description = "WooCommerce connector id"),
        ("X-WC-Webhook-Signature" = String, Header, description = "Base64 HMAC-SHA256 of the body"),
        ("X-WC-Webhook-Topic" = Option<String>, Header, description = "Event topic, e.g. product.updated")
    ),
    request_body(content = serde_json::Value, description = "WooCommerce webhook payload"),
    responses(
        (status = 200, description = "Event applied or ignored", body = WebhookAcceptResponse),
        (status = 400, description = "Malformed payload", body = ApiError),
        (status = 401, description = "Signature rejected", body = ApiError),
        (status = 404, description = "Connector not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn woocommerce_webhook(
    State(state): State<AppState>,
    Path(connector_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAcceptResponse>, ApiError> {
    verify_webhook_signature(WebhookSource::Woocommerce, &body, &headers, &state.config)?;

    let connector = state.ingest.connector_by_id(connector_id).await?;
    if connector.kind != ConnectorKind::Woocommerce.as_str() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "BAD_PAYLOAD",
            format!("connector {connector_id} is not a WooCommerce connector"),
        ));
    }

    // Delivery pings on webhook creation carry no topic.
    let Some(topic) = header_str(&headers, WOOCOMMERCE_TOPIC_HEADER) else {
        debug!(connector_id = %connector.id, "WooCommerce ping acknowledged");
        return Ok(Json(ApplyOutcome::Ignored.into()));
    };

    let outcome = state
        .ingest
        .handle_webhook(&connector, topic, &body)
        .await?;
    info!(connector_id = %connector.id, topic, "WooCommerce webhook processed");
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_describe_their_effect() {
        let deleted: WebhookAcceptResponse = ApplyOutcome::Deleted { found: true }.into();
        assert_eq!(deleted.status, "processed");
        assert_eq!(deleted.outcome, "product_deactivated");

        let ignored: WebhookAcceptResponse = ApplyOutcome::Ignored.into();
        assert_eq!(ignored.status, "ignored");
        assert!(ignored.product_id.is_none());
    }

    #[test]
    fn blank_headers_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(SHOPIFY_SHOP_DOMAIN_HEADER, "  ".parse().unwrap());
        assert_eq!(header_str(&headers, SHOPIFY_SHOP_DOMAIN_HEADER), None);
        headers.insert(SHOPIFY_TOPIC_HEADER, "products/update".parse().unwrap());
        assert_eq!(header_str(&headers, SHOPIFY_TOPIC_HEADER), Some("products/update"));
    }
}
