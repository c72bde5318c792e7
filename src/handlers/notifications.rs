//! # Notification API Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::types::{PageQuery, PaginatedResponse};
use crate::models::notification;
use crate::repositories::NotificationRepository;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    pub id: Uuid,
    /// `feed_generated` or `feed_failed`
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub priority: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub entity_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<notification::Model> for NotificationResponse {
    fn from(model: notification::Model) -> Self {
        Self {
            id: model.id,
            notification_type: model.notification_type,
            title: model.title,
            message: model.message,
            priority: model.priority,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            entity_name: model.entity_name,
            metadata: model.metadata,
            read: model.read,
            read_at: model.read_at.map(|at| at.with_timezone(&Utc)),
            expires_at: model.expires_at.map(|at| at.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotificationsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Only unread notifications
    #[serde(default)]
    pub unread: bool,
}

/// Lists notifications, newest first
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Page of notifications", body = PaginatedResponse<NotificationResponse>)
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<PaginatedResponse<NotificationResponse>>, ApiError> {
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    let (notifications, total) = NotificationRepository::new(state.db.clone())
        .list(state.organization_id, query.unread, page, limit)
        .await?;
    Ok(Json(PaginatedResponse::new(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
        page,
        limit,
        total,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = NotificationResponse),
        (status = 404, description = "Notification not found", body = ApiError)
    ),
    tag = "notifications"
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let notification = NotificationRepository::new(state.db.clone())
        .mark_read(state.organization_id, id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("notification not found: {id}"),
            )
        })?;
    Ok(Json(notification.into()))
}
