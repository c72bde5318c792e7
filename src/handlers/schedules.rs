//! # Schedule API Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::feed_schedule;
use crate::server::AppState;

/// Recurring regeneration settings of a feed
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduleResponse {
    pub feed_id: Uuid,
    pub enabled: bool,
    pub interval_hours: i32,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// `active`, `paused` or `failed`
    pub status: String,
    pub consecutive_failures: i32,
}

impl From<feed_schedule::Model> for ScheduleResponse {
    fn from(model: feed_schedule::Model) -> Self {
        Self {
            feed_id: model.feed_id,
            enabled: model.enabled,
            interval_hours: model.interval_hours,
            next_run_at: model.next_run_at.with_timezone(&Utc),
            last_run_at: model.last_run_at.map(|at| at.with_timezone(&Utc)),
            status: model.status,
            consecutive_failures: model.consecutive_failures,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScheduleRequest {
    pub enabled: bool,
    #[schema(minimum = 1, maximum = 720, example = 6)]
    pub interval_hours: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/schedule",
    params(("id" = Uuid, Path, description = "Feed id")),
    responses(
        (status = 200, description = "Schedule", body = ScheduleResponse),
        (status = 404, description = "Feed or schedule not found", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    Ok(Json(state.scheduler.get_schedule(id).await?.into()))
}

/// Creates or replaces the schedule; saving re-arms it from now
#[utoipa::path(
    put,
    path = "/api/v1/feeds/{id}/schedule",
    params(("id" = Uuid, Path, description = "Feed id")),
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Saved schedule", body = ScheduleResponse),
        (status = 400, description = "Interval out of range", body = ApiError),
        (status = 404, description = "Feed not found", body = ApiError),
        (status = 422, description = "Too many enabled schedules", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn put_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let schedule = state
        .scheduler
        .configure(id, request.enabled, request.interval_hours)
        .await?;
    Ok(Json(schedule.into()))
}
