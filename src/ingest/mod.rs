//! # Product ingestion
//!
//! Ingestors pull product listings from a source (Shopify, WooCommerce, CSV) or parse the
//! source's webhook payloads. Both paths normalize into a [`CanonicalProduct`] and land in
//! the product store through [`IngestService`].

pub mod canonical;
pub mod csv;
pub mod inventory;
pub mod registry;
pub mod service;
pub mod shopify;
pub mod trait_;
pub mod woocommerce;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::{ApiError, PipelineError};
use crate::webhook_verification::VerificationError;

pub use canonical::CanonicalProduct;
pub use registry::IngestorRegistry;
pub use service::{IngestService, SyncReport};
pub use trait_::{IngestEvent, Ingestor, InventoryReading, ProductPage};

/// Failures raised while fetching or parsing source data.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no connector registered for {0}")]
    NotFoundConnector(String),
    #[error("bad payload: {0}")]
    BadPayload(String),
    #[error("signature rejected: {0}")]
    UnauthorizedSignature(String),
    /// Transport-level failure; callers may retry.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Non-2xx from the source; never retried.
    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
}

impl IngestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::UpstreamUnavailable(_))
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            IngestError::BadPayload(error.to_string())
        } else {
            IngestError::UpstreamUnavailable(error.to_string())
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(error: serde_json::Error) -> Self {
        IngestError::BadPayload(error.to_string())
    }
}

impl From<VerificationError> for IngestError {
    fn from(error: VerificationError) -> Self {
        IngestError::UnauthorizedSignature(error.to_string())
    }
}

impl From<IngestError> for PipelineError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::NotFoundConnector(domain) => PipelineError::not_found("connector", domain),
            IngestError::BadPayload(message) => PipelineError::BadPayload(message),
            IngestError::UnauthorizedSignature(message) => PipelineError::Unauthorized(message),
            IngestError::UpstreamUnavailable(message) => PipelineError::UpstreamUnavailable(message),
            error @ IngestError::UpstreamStatus { .. } => {
                PipelineError::UpstreamUnavailable(error.to_string())
            }
            IngestError::Storage(err) => PipelineError::Storage(err),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        PipelineError::from(error).into()
    }
}

/// What an ingestor needs to reach one connector's source.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Origin of the source API, without trailing slash
    pub base_url: String,
    /// Opened credentials document
    pub credentials: JsonValue,
    /// Connector currency, used when a payload carries none
    pub currency: Option<String>,
    pub page_size: u32,
}

impl SourceContext {
    /// Builds the API origin from a connector's `shop_domain`.
    ///
    /// A domain that already carries a scheme is used as-is.
    pub fn base_url_for(shop_domain: &str) -> String {
        let trimmed = shop_domain.trim().trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        }
    }

    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .and_then(JsonValue::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_adds_https_to_bare_domains() {
        assert_eq!(
            SourceContext::base_url_for("demo.myshopify.com"),
            "https://demo.myshopify.com"
        );
        assert_eq!(
            SourceContext::base_url_for("http://127.0.0.1:9000/"),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(IngestError::UpstreamUnavailable("reset".into()).is_retryable());
        assert!(
            !IngestError::UpstreamStatus {
                status: 500,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!IngestError::BadPayload("x".into()).is_retryable());
    }
}
