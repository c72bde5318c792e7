//! # Feed Webhook Handlers
//!
//! Outbound webhook settings of a feed and its delivery log.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::types::{PageQuery, PaginatedResponse};
use crate::models::webhook::{self, WebhookEvent};
use crate::models::webhook_delivery;
use crate::repositories::webhook::WebhookSettings;
use crate::server::AppState;

/// Webhook settings and delivery counters. The signing secret is never echoed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub feed_id: Option<Uuid>,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub enabled: bool,
    pub has_secret: bool,
    pub retry_count: i32,
    pub timeout_seconds: i32,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl From<webhook::Model> for WebhookResponse {
    fn from(model: webhook::Model) -> Self {
        let events = model.event_list();
        Self {
            id: model.id,
            feed_id: model.feed_id,
            url: model.url,
            events,
            enabled: model.enabled,
            has_secret: model.secret.as_deref().is_some_and(|s| !s.is_empty()),
            retry_count: model.retry_count,
            timeout_seconds: model.timeout_seconds,
            total_deliveries: model.total_deliveries,
            successful_deliveries: model.successful_deliveries,
            failed_deliveries: model.failed_deliveries,
            last_delivery_at: model.last_delivery_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookRequest {
    #[schema(example = "https://sink.example/hook")]
    pub url: String,
    pub events: Vec<WebhookEvent>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Signs bodies with `X-Webhook-Signature: sha256=<hex>` when set
    pub secret: Option<String>,
    /// Defaults to 3
    pub retry_count: Option<i32>,
    /// Defaults to 10
    pub timeout_seconds: Option<i32>,
}

fn enabled_by_default() -> bool {
    true
}

/// One delivery attempt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryResponse {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub run_id: Option<Uuid>,
    pub event: String,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub success: bool,
    pub error: Option<String>,
    pub retry_attempt: i32,
    pub delivered_at: DateTime<Utc>,
}

impl From<webhook_delivery::Model> for DeliveryResponse {
    fn from(model: webhook_delivery::Model) -> Self {
        Self {
            id: model.id,
            webhook_id: model.webhook_id,
            run_id: model.run_id,
            event: model.event,
            status_code: model.status_code,
            response_body: model.response_body,
            response_time_ms: model.response_time_ms,
            success: model.success,
            error: model.error,
            retry_attempt: model.retry_attempt,
            delivered_at: model.delivered_at.with_timezone(&Utc),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/webhook",
    params(("id" = Uuid, Path, description = "Feed id")),
    responses(
        (status = 200, description = "Webhook", body = WebhookResponse),
        (status = 404, description = "Feed or webhook not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookResponse>, ApiError> {
    Ok(Json(state.feeds.webhook(id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/feeds/{id}/webhook",
    params(("id" = Uuid, Path, description = "Feed id")),
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Saved webhook", body = WebhookResponse),
        (status = 400, description = "Invalid settings", body = ApiError),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn put_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let settings = WebhookSettings {
        url: request.url,
        events: request.events,
        enabled: request.enabled,
        secret: request.secret,
        retry_count: request.retry_count,
        timeout_seconds: request.timeout_seconds,
    };
    Ok(Json(state.feeds.configure_webhook(id, settings).await?.into()))
}

/// Delivery log of the feed, latest first
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/webhook/deliveries",
    params(("id" = Uuid, Path, description = "Feed id"), PageQuery),
    responses(
        (status = 200, description = "Page of delivery attempts", body = PaginatedResponse<DeliveryResponse>),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<DeliveryResponse>>, ApiError> {
    let (page, limit) = query.resolve()?;
    let (deliveries, total) = state.feeds.deliveries(id, page, limit).await?;
    Ok(Json(PaginatedResponse::new(
        deliveries.into_iter().map(DeliveryResponse::from).collect(),
        page,
        limit,
        total,
    )))
}
