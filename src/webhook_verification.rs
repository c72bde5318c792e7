//! # Webhook Signature Verification
//!
//! Inbound Shopify and WooCommerce webhooks carry a base64 HMAC-SHA256 of the raw body.
//! Outbound webhooks are signed with the same algorithm, hex encoded.

use axum::http::{HeaderMap, StatusCode};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const SHOPIFY_HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const WOOCOMMERCE_SIGNATURE_HEADER: &str = "x-wc-webhook-signature";
/// Header carrying the signature of outbound webhook bodies.
pub const OUTBOUND_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,
}

impl VerificationError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        warn!(error = %error, "Rejected inbound webhook");
        ApiError::new(error.status_code(), "UNAUTHORIZED", error.to_string())
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;

/// Sources whose inbound webhooks are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookSource {
    Shopify,
    Woocommerce,
}

impl WebhookSource {
    pub fn header(self) -> &'static str {
        match self {
            WebhookSource::Shopify => SHOPIFY_HMAC_HEADER,
            WebhookSource::Woocommerce => WOOCOMMERCE_SIGNATURE_HEADER,
        }
    }

    fn secret(self, config: &AppConfig) -> Option<&str> {
        match self {
            WebhookSource::Shopify => config.shopify_webhook_secret.as_deref(),
            WebhookSource::Woocommerce => config.woocommerce_webhook_secret.as_deref(),
        }
    }
}

/// Checks a base64 HMAC-SHA256 signature of `body`.
///
/// Without a secret the check is skipped, which is how development setups run.
pub fn verify_hmac_base64(
    secret: Option<&str>,
    body: &[u8],
    header: &str,
    signature: Option<&str>,
) -> VerificationResult<()> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        warn!(header, "Webhook secret not configured; skipping signature check");
        return Ok(());
    };

    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VerificationError::MissingSignature {
            header: header.to_string(),
        })?;

    let provided = STANDARD
        .decode(signature)
        .map_err(|_| VerificationError::InvalidSignatureFormat {
            header: format!("{header} is not valid base64"),
        })?;

    let expected = compute_hmac(secret, body)?;
    if expected.as_slice().ct_eq(provided.as_slice()).into() {
        debug!(header, body_size = body.len(), "Webhook signature verified");
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies the signature header of an inbound webhook for `source`.
pub fn verify_webhook_signature(
    source: WebhookSource,
    body: &[u8],
    headers: &HeaderMap,
    config: &AppConfig,
) -> VerificationResult<()> {
    let signature = headers
        .get(source.header())
        .and_then(|value| value.to_str().ok());
    verify_hmac_base64(source.secret(config), body, source.header(), signature)
}

/// Base64 HMAC-SHA256 of `body`, as sent by the upstream platforms.
pub fn sign_payload_base64(secret: &str, body: &[u8]) -> String {
    compute_hmac(secret, body)
        .map(|mac| STANDARD.encode(mac))
        .unwrap_or_default()
}

/// `sha256=<hex>` header value for outbound webhook bodies.
pub fn sign_payload_hex(secret: &str, body: &[u8]) -> String {
    let digest = compute_hmac(secret, body).unwrap_or_default();
    format!("sha256={}", hex::encode(digest))
}

fn compute_hmac(secret: &str, body: &[u8]) -> VerificationResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}
