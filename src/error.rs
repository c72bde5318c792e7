//! # Error Handling
//!
//! Domain failures are expressed as [`PipelineError`]; request handlers turn them into
//! [`ApiError`], a `application/problem+json` body carrying `{error, message, details?}` and
//! the request trace id.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Failure kinds shared by the ingest, generation, scheduling and dispatch paths.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid payload: {0}")]
    BadPayload(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    ConflictUniqueness(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
    #[error("render error: {0}")]
    Render(String),
    #[error("feed {feed_id} already has a generation in progress")]
    ConcurrentRun { feed_id: Uuid },
    #[error("schedule capacity reached: at most {limit} enabled schedules")]
    ScheduleCapacity { limit: u64 },
}

impl PipelineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable code used in the `error` field of HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::BadPayload(_) => "BAD_PAYLOAD",
            PipelineError::NotFound { .. } => "NOT_FOUND",
            PipelineError::Unauthorized(_) => "UNAUTHORIZED",
            PipelineError::ConflictUniqueness(_) => "CONFLICT",
            PipelineError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            PipelineError::Storage(err) if is_unique_violation(err) => "CONFLICT",
            PipelineError::Storage(_) => "STORAGE_ERROR",
            PipelineError::Render(_) => "RENDER_ERROR",
            PipelineError::ConcurrentRun { .. } => "CONCURRENT_RUN",
            PipelineError::ScheduleCapacity { .. } => "SCHEDULE_CAPACITY",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::BadPayload(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PipelineError::ConflictUniqueness(_) | PipelineError::ConcurrentRun { .. } => {
                StatusCode::CONFLICT
            }
            PipelineError::Storage(err) if is_unique_violation(err) => StatusCode::CONFLICT,
            PipelineError::Storage(sea_orm::DbErr::Conn(_)) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Storage(_) | PipelineError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            PipelineError::ScheduleCapacity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub error: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: telemetry::current_trace_id().map(String::into_boxed_str),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let status = error.status_code();
        let code = error.code();
        match &error {
            PipelineError::Storage(db_err) if code == "CONFLICT" => {
                tracing::debug!(error = ?db_err, "unique constraint violation");
                ApiError::new(status, code, "Resource already exists")
            }
            PipelineError::Storage(db_err) => {
                tracing::error!(error = ?db_err, "storage failure");
                ApiError::new(status, code, "Database error occurred")
            }
            PipelineError::Render(message) => {
                tracing::error!(%message, "render failure");
                ApiError::new(status, code, error.to_string())
            }
            PipelineError::NotFound { entity, id } => ApiError::new(status, code, error.to_string())
                .with_details(json!({ "entity": entity, "id": id })),
            PipelineError::ConcurrentRun { feed_id } => {
                ApiError::new(status, code, error.to_string())
                    .with_details(json!({ "feed_id": feed_id }))
            }
            _ => ApiError::new(status, code, error.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        PipelineError::Storage(error).into()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "BAD_PAYLOAD", message)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_PAYLOAD", rejection.body_text())
    }
}

/// Logs a storage failure with its context and wraps it.
pub fn map_db_err(context: &'static str, error: sea_orm::DbErr) -> PipelineError {
    tracing::error!(error = ?error, context, "database operation failed");
    PipelineError::Storage(error)
}

fn database_error_code(error: &sea_orm::DbErr) -> Option<String> {
    use sea_orm::RuntimeErr;

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return None,
    };
    runtime_err
        .as_database_error()
        .and_then(|db_error| db_error.code().map(|code| code.into_owned()))
}

/// True when the database rejected a write on a unique index.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    if let sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
    | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) = error
        && let Some(db_error) = sqlx_err.as_database_error()
        && db_error.is_unique_violation()
    {
        return true;
    }

    database_error_code(error)
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_str()))
}

/// True when an `ON CONFLICT` target has no matching unique index (legacy schemas).
pub fn is_missing_conflict_target(error: &sea_orm::DbErr) -> bool {
    const PG_INVALID_CONFLICT_TARGET: &str = "42P10";

    if database_error_code(error).as_deref() == Some(PG_INVALID_CONFLICT_TARGET) {
        return true;
    }
    error
        .to_string()
        .contains("ON CONFLICT clause does not match any PRIMARY KEY or UNIQUE constraint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_map_to_expected_statuses() {
        let cases = [
            (PipelineError::BadPayload("x".into()), StatusCode::BAD_REQUEST),
            (PipelineError::not_found("feed", "1"), StatusCode::NOT_FOUND),
            (PipelineError::Unauthorized("sig".into()), StatusCode::UNAUTHORIZED),
            (
                PipelineError::ConcurrentRun {
                    feed_id: Uuid::nil(),
                },
                StatusCode::CONFLICT,
            ),
            (
                PipelineError::ScheduleCapacity { limit: 5 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PipelineError::UpstreamUnavailable("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::Render("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn api_error_body_uses_error_field() {
        let api: ApiError = PipelineError::not_found("feed", "abc").into();
        let body = serde_json::to_value(&api).unwrap();
        assert_eq!(body["error"], "NOT_FOUND");
        assert_eq!(body["message"], "feed not found: abc");
        assert_eq!(body["details"]["entity"], "feed");
        assert!(body.get("status").is_none());
    }

    #[test]
    fn storage_errors_hide_internals() {
        let api: ApiError = sea_orm::DbErr::Custom("secret table".into()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&*api.error, "STORAGE_ERROR");
        assert!(!api.message.contains("secret"));
    }

    #[test]
    fn content_type_is_problem_json() {
        let response = ApiError::new(StatusCode::BAD_REQUEST, "BAD_PAYLOAD", "nope").into_response();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn missing_conflict_target_is_detected_from_sqlite_message() {
        let err = sea_orm::DbErr::Custom(
            "ON CONFLICT clause does not match any PRIMARY KEY or UNIQUE constraint".into(),
        );
        assert!(is_missing_conflict_target(&err));
        assert!(!is_missing_conflict_target(&sea_orm::DbErr::Custom("other".into())));
    }
}
