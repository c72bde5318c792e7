//! # Feed API Handlers
//!
//! Feed CRUD, regeneration, downloads and run history, plus the scheduler trigger and the
//! in-process webhook receiver.

use axum::{
    extract::{Path, Query, State},
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::FeedEvent;
use crate::feeds::{CreateFeed, FeedAnalytics, FeedArtifact};
use crate::filter::FeedFilter;
use crate::handlers::types::{PageQuery, PaginatedResponse};
use crate::models::feed::{self, FeedChannel, FeedFormat};
use crate::models::generation_run;
use crate::render::ValidationIssue;
use crate::repositories::feed::FeedChanges;
use crate::scheduler::TickReport;
use crate::server::AppState;

/// Feed definition as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FeedResponse {
    pub id: Uuid,
    /// Connector the feed draws from; all connectors when null
    pub connector_id: Option<Uuid>,
    pub name: String,
    pub channel: String,
    pub format: String,
    pub filter: FeedFilter,
    /// `active`, `generating` or `error`
    pub status: String,
    pub products_count: i32,
    pub last_generated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<feed::Model> for FeedResponse {
    fn from(model: feed::Model) -> Self {
        let filter = model.filter();
        Self {
            id: model.id,
            connector_id: model.connector_id,
            name: model.name,
            channel: model.channel,
            format: model.format,
            filter,
            status: model.status,
            products_count: model.products_count,
            last_generated: model.last_generated.map(|at| at.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Request body for creating a feed
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFeedRequest {
    #[schema(example = "Google Shopping")]
    pub name: String,
    pub channel: FeedChannel,
    /// Defaults to xml for google, csv for facebook and json for instagram
    pub format: Option<FeedFormat>,
    pub connector_id: Option<Uuid>,
    #[serde(default)]
    pub filter: FeedFilter,
}

/// Partial feed update; omitted fields are unchanged
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateFeedRequest {
    pub name: Option<String>,
    pub channel: Option<FeedChannel>,
    pub format: Option<FeedFormat>,
    /// `null` widens the feed to every connector
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Uuid>)]
    pub connector_id: Option<Option<Uuid>>,
    pub filter: Option<FeedFilter>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Accepted regeneration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegenerateResponse {
    pub run_id: Uuid,
    #[schema(example = "generating")]
    pub status: String,
}

/// Download query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Render in another format than the feed's own
    pub format: Option<FeedFormat>,
    /// Render only the first products, in feed order
    pub limit: Option<u64>,
}

/// Preview query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PreviewQuery {
    /// Number of products to render (default 10, max 100)
    pub limit: Option<u64>,
}

/// Run history query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// `started`, `completed` or `failed`
    pub status: Option<String>,
}

/// One generation run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerationRunResponse {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub status: String,
    pub products_processed: i32,
    pub products_included: i32,
    pub products_excluded: i32,
    pub generation_time_ms: Option<i64>,
    pub file_size_bytes: Option<i64>,
    pub file_url: Option<String>,
    pub file_format: String,
    pub error_message: Option<String>,
    pub validation_issues: Vec<ValidationIssue>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<generation_run::Model> for GenerationRunResponse {
    fn from(model: generation_run::Model) -> Self {
        let validation_issues = model
            .validation_issues
            .and_then(|issues| serde_json::from_value(issues).ok())
            .unwrap_or_default();
        Self {
            id: model.id,
            feed_id: model.feed_id,
            status: model.status,
            products_processed: model.products_processed,
            products_included: model.products_included,
            products_excluded: model.products_excluded,
            generation_time_ms: model.generation_time_ms,
            file_size_bytes: model.file_size_bytes,
            file_url: model.file_url,
            file_format: model.file_format,
            error_message: model.error_message,
            validation_issues,
            started_at: model.started_at.with_timezone(&Utc),
            completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// Acknowledgement of a loopback event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReceiverResponse {
    pub status: String,
    pub notification_id: Uuid,
}

fn artifact_response(artifact: FeedArtifact, attachment: bool) -> Response {
    let mut headers = vec![(CONTENT_TYPE, artifact.content_type.to_string())];
    if attachment {
        headers.push((
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        ));
    }
    let mut response = artifact.bytes.into_response();
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// Creates a feed
#[utoipa::path(
    post,
    path = "/api/v1/feeds",
    request_body = CreateFeedRequest,
    responses(
        (status = 201, description = "Feed created", body = FeedResponse),
        (status = 400, description = "Invalid feed definition", body = ApiError),
        (status = 404, description = "Connector not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn create_feed(
    State(state): State<AppState>,
    Json(request): Json<CreateFeedRequest>,
) -> Result<(StatusCode, Json<FeedResponse>), ApiError> {
    let feed = state
        .feeds
        .create(CreateFeed {
            name: request.name,
            channel: request.channel,
            format: request.format,
            connector_id: request.connector_id,
            filter: request.filter,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(feed.into())))
}

/// Lists feeds, newest first
#[utoipa::path(
    get,
    path = "/api/v1/feeds",
    responses(
        (status = 200, description = "All feeds of the organization", body = [FeedResponse])
    ),
    tag = "feeds"
)]
pub async fn list_feeds(State(state): State<AppState>) -> Result<Json<Vec<FeedResponse>>, ApiError> {
    let feeds = state.feeds.list().await?;
    Ok(Json(feeds.into_iter().map(FeedResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}",
    params(("id" = Uuid, Path, description = "Feed id")),
    responses(
        (status = 200, description = "Feed", body = FeedResponse),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn get_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedResponse>, ApiError> {
    Ok(Json(state.feeds.get(id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/feeds/{id}",
    params(("id" = Uuid, Path, description = "Feed id")),
    request_body = UpdateFeedRequest,
    responses(
        (status = 200, description = "Updated feed", body = FeedResponse),
        (status = 400, description = "Invalid changes", body = ApiError),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn update_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateFeedRequest>,
) -> Result<Json<FeedResponse>, ApiError> {
    let changes = FeedChanges {
        name: request.name,
        channel: request.channel,
        format: request.format,
        connector_id: request.connector_id,
        filter: request.filter,
    };
    Ok(Json(state.feeds.update(id, changes).await?.into()))
}

/// Deletes a feed together with its schedule, webhook and run history
#[utoipa::path(
    delete,
    path = "/api/v1/feeds/{id}",
    params(("id" = Uuid, Path, description = "Feed id")),
    responses(
        (status = 204, description = "Feed deleted"),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn delete_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.feeds.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Starts a regeneration in the background
#[utoipa::path(
    post,
    path = "/api/v1/feeds/{id}/regenerate",
    params(("id" = Uuid, Path, description = "Feed id")),
    responses(
        (status = 200, description = "Run started", body = RegenerateResponse),
        (status = 404, description = "Feed not found", body = ApiError),
        (status = 409, description = "A run is already in progress", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn regenerate_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    let handle = state.feeds.regenerate(id).await?;
    Ok(Json(RegenerateResponse {
        run_id: handle.run_id,
        status: feed::FEED_STATUS_GENERATING.to_string(),
    }))
}

/// Renders the complete feed as a file
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/download",
    params(("id" = Uuid, Path, description = "Feed id"), DownloadQuery),
    responses(
        (status = 200, description = "Feed file", content_type = "application/octet-stream"),
        (status = 400, description = "Zero limit", body = ApiError),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn download_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let artifact = state.feeds.download(id, query.format, query.limit).await?;
    info!(feed_id = %id, bytes = artifact.bytes.len(), "Feed downloaded");
    Ok(artifact_response(artifact, true))
}

/// Renders the first products of the feed
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/preview",
    params(("id" = Uuid, Path, description = "Feed id"), PreviewQuery),
    responses(
        (status = 200, description = "Partial feed in the feed's format"),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn preview_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    let artifact = state.feeds.preview(id, query.limit).await?;
    Ok(artifact_response(artifact, false))
}

/// Generation runs of a feed, newest first
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/history",
    params(("id" = Uuid, Path, description = "Feed id"), HistoryQuery),
    responses(
        (status = 200, description = "Page of runs", body = PaginatedResponse<GenerationRunResponse>),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn feed_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PaginatedResponse<GenerationRunResponse>>, ApiError> {
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    let (runs, total) = state
        .feeds
        .history(id, query.status.as_deref(), page, limit)
        .await?;
    Ok(Json(PaginatedResponse::new(
        runs.into_iter().map(GenerationRunResponse::from).collect(),
        page,
        limit,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/feeds/{id}/analytics",
    params(("id" = Uuid, Path, description = "Feed id")),
    responses(
        (status = 200, description = "Run statistics", body = FeedAnalytics),
        (status = 404, description = "Feed not found", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn feed_analytics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedAnalytics>, ApiError> {
    Ok(Json(state.feeds.analytics(id).await?))
}

/// Runs one scheduler tick now
#[utoipa::path(
    post,
    path = "/api/v1/feeds/run-scheduled",
    responses(
        (status = 200, description = "Tick report", body = TickReport)
    ),
    tag = "schedules"
)]
pub async fn run_scheduled(State(state): State<AppState>) -> Result<Json<TickReport>, ApiError> {
    let report = state.scheduler.tick(Utc::now().fixed_offset()).await?;
    Ok(Json(report))
}

/// Receives this service's own webhook events and turns them into notifications
#[utoipa::path(
    post,
    path = "/api/v1/feeds/webhook-receiver",
    request_body = FeedEvent,
    responses(
        (status = 200, description = "Event recorded", body = ReceiverResponse),
        (status = 400, description = "Unknown event", body = ApiError)
    ),
    tag = "feeds"
)]
pub async fn webhook_receiver(
    State(state): State<AppState>,
    Json(event): Json<FeedEvent>,
) -> Result<Json<ReceiverResponse>, ApiError> {
    let notification = state.projector.project(&event).await.map_err(|err| {
        error!(error = ?err, feed_id = %event.feed_id(), "Failed to record notification");
        ApiError::from(err)
    })?;
    Ok(Json(ReceiverResponse {
        status: "received".to_string(),
        notification_id: notification.id,
    }))
}
