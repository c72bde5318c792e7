//! # Connector API Handlers
//!
//! Registration of product sources and on-demand pull syncs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::connector::{self, ConnectorKind};
use crate::server::AppState;

/// Connector as returned by the API. Credentials are never echoed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectorResponse {
    pub id: Uuid,
    pub kind: String,
    /// Shop host name, or the document URL of a CSV connector
    pub shop_domain: String,
    pub currency: Option<String>,
    /// `pending`, `active` or `inactive`
    pub status: String,
    pub has_credentials: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Set while a truncated listing is waiting to resume
    pub sync_cursor: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<connector::Model> for ConnectorResponse {
    fn from(model: connector::Model) -> Self {
        Self {
            id: model.id,
            kind: model.kind,
            shop_domain: model.shop_domain,
            currency: model.currency,
            status: model.status,
            has_credentials: model.credentials_ciphertext.is_some(),
            last_sync_at: model.last_sync_at.map(|at| at.with_timezone(&Utc)),
            sync_cursor: model.sync_cursor,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConnectorRequest {
    pub kind: ConnectorKind,
    #[schema(example = "demo.myshopify.com")]
    pub shop_domain: String,
    /// Source credentials, e.g. `{"access_token": "..."}` or `{"consumer_key": "...", "consumer_secret": "..."}`
    #[serde(default)]
    pub credentials: serde_json::Value,
    /// ISO 4217 code; fetched from the shop on first sync when omitted
    pub currency: Option<String>,
}

/// Accepted background sync
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncAcceptedResponse {
    pub connector_id: Uuid,
    #[schema(example = "syncing")]
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/connectors",
    request_body = CreateConnectorRequest,
    responses(
        (status = 201, description = "Connector registered", body = ConnectorResponse),
        (status = 400, description = "Invalid registration", body = ApiError),
        (status = 409, description = "Connector already exists for the shop", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn create_connector(
    State(state): State<AppState>,
    Json(request): Json<CreateConnectorRequest>,
) -> Result<(StatusCode, Json<ConnectorResponse>), ApiError> {
    if let Some(currency) = &request.currency
        && (currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()))
    {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "BAD_PAYLOAD",
            "currency must be a three-letter ISO 4217 code",
        ));
    }
    let connector = state
        .ingest
        .register_connector(
            request.kind,
            &request.shop_domain,
            request.credentials,
            request.currency,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(connector.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/connectors",
    responses(
        (status = 200, description = "Registered connectors", body = [ConnectorResponse])
    ),
    tag = "connectors"
)]
pub async fn list_connectors(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectorResponse>>, ApiError> {
    let connectors = state.ingest.list_connectors().await?;
    Ok(Json(
        connectors.into_iter().map(ConnectorResponse::from).collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/connectors/{id}",
    params(("id" = Uuid, Path, description = "Connector id")),
    responses(
        (status = 200, description = "Connector", body = ConnectorResponse),
        (status = 404, description = "Connector not found", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn get_connector(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectorResponse>, ApiError> {
    Ok(Json(state.ingest.connector_by_id(id).await?.into()))
}

/// Starts a pull sync in the background
#[utoipa::path(
    post,
    path = "/api/v1/connectors/{id}/sync",
    params(("id" = Uuid, Path, description = "Connector id")),
    responses(
        (status = 202, description = "Sync started", body = SyncAcceptedResponse),
        (status = 404, description = "Connector not found", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn sync_connector(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SyncAcceptedResponse>), ApiError> {
    let connector = state.ingest.connector_by_id(id).await?;

    let ingest = state.ingest.clone();
    tokio::spawn(async move {
        match ingest.pull_sync(connector.id).await {
            Ok(report) => info!(
                connector_id = %report.connector_id,
                pages = report.pages,
                products_upserted = report.products_upserted,
                truncated = report.truncated,
                "Background sync finished"
            ),
            Err(err) => error!(connector_id = %connector.id, error = %err, "Background sync failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncAcceptedResponse {
            connector_id: id,
            status: "syncing".to_string(),
        }),
    ))
}
