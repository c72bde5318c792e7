//! # Outbound Webhook Dispatcher
//!
//! Delivers regeneration events to subscribed webhooks. Attempts for one webhook are
//! sequential with linear backoff; different webhooks are served in parallel. Every attempt
//! is written to the delivery log, so delivery is at-least-once but fully observable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::header::CONTENT_TYPE;
use sea_orm::DatabaseConnection;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::events::FeedEvent;
use crate::models::webhook;
use crate::notifications::NotificationProjector;
use crate::repositories::webhook_delivery::DeliveryAttempt;
use crate::repositories::{WebhookDeliveryRepository, WebhookRepository};
use crate::webhook_verification::{OUTBOUND_SIGNATURE_HEADER, sign_payload_hex};

/// Path of this service's own webhook receiver.
pub const RECEIVER_PATH: &str = "/api/v1/feeds/webhook-receiver";
pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const FEED_ID_HEADER: &str = "X-Feed-ID";

/// Outcome of delivering one event to one webhook
#[derive(Debug, Clone)]
pub struct DeliverySummary {
    pub webhook_id: Uuid,
    pub attempts: u32,
    pub delivered: bool,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    db: DatabaseConnection,
    organization_id: Uuid,
    config: DispatchConfig,
    projector: Arc<NotificationProjector>,
}

impl WebhookDispatcher {
    pub fn new(
        client: reqwest::Client,
        db: DatabaseConnection,
        organization_id: Uuid,
        config: DispatchConfig,
        projector: Arc<NotificationProjector>,
    ) -> Self {
        Self {
            client,
            db,
            organization_id,
            config,
            projector,
        }
    }

    /// Sends `event` to every enabled subscriber. Failures are logged and recorded, never
    /// returned.
    #[instrument(skip_all, fields(feed_id = %event.feed_id(), event = %event.kind()))]
    pub async fn dispatch(&self, event: &FeedEvent) -> Vec<DeliverySummary> {
        let subscribers = match WebhookRepository::new(self.db.clone())
            .subscribers(self.organization_id, event.feed_id(), event.kind())
            .await
        {
            Ok(subscribers) => subscribers,
            Err(err) => {
                error!(error = ?err, "Failed to load webhook subscribers");
                return Vec::new();
            }
        };
        if subscribers.is_empty() {
            debug!("No webhook subscribers for event");
            return Vec::new();
        }

        let mut handles = Vec::with_capacity(subscribers.len());
        for webhook in subscribers {
            let dispatcher = self.clone();
            let event = event.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.deliver(&webhook, &event).await
            }));
        }

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(err) => error!(error = ?err, "Webhook delivery task panicked or was cancelled"),
            }
        }
        summaries
    }

    /// Delivers to one webhook: up to `retry_count + 1` attempts, or one loopback call.
    #[instrument(skip_all, fields(webhook_id = %webhook.id))]
    pub async fn deliver(&self, webhook: &webhook::Model, event: &FeedEvent) -> DeliverySummary {
        if is_loopback(&webhook.url) {
            return self.deliver_loopback(webhook, event).await;
        }

        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(err) => {
                error!(error = ?err, "Failed to serialize webhook payload");
                return DeliverySummary {
                    webhook_id: webhook.id,
                    attempts: 0,
                    delivered: false,
                };
            }
        };
        let signature = webhook
            .secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| sign_payload_hex(secret, &body));
        let timeout = Duration::from_secs(webhook.timeout_seconds.max(1) as u64);
        let max_attempts = webhook.retry_count.max(0) as u32 + 1;

        let mut attempts = 0;
        let mut delivered = false;
        for attempt in 0..max_attempts {
            if attempt > 0 {
                sleep(Duration::from_millis(
                    self.config.backoff_unit_ms * u64::from(attempt),
                ))
                .await;
            }
            attempts += 1;

            let mut request = self
                .client
                .post(&webhook.url)
                .timeout(timeout)
                .header(CONTENT_TYPE, "application/json")
                .header(EVENT_HEADER, event.kind().as_str())
                .header(FEED_ID_HEADER, event.feed_id().to_string())
                .body(body.clone());
            if let Some(signature) = &signature {
                request = request.header(OUTBOUND_SIGNATURE_HEADER, signature);
            }

            let started = Instant::now();
            let outcome = request.send().await;
            let elapsed_ms = started.elapsed().as_millis() as i64;
            histogram!("webhook_delivery_duration_ms").record(elapsed_ms as f64);

            let record = match outcome {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    AttemptRecord {
                        status_code: Some(i32::from(status.as_u16())),
                        response_body: Some(excerpt(&text, self.config.response_excerpt_chars)),
                        success: status.is_success(),
                        error: (!status.is_success()).then(|| format!("HTTP {}", status.as_u16())),
                    }
                }
                Err(err) => AttemptRecord {
                    status_code: None,
                    response_body: None,
                    success: false,
                    error: Some(if err.is_timeout() {
                        format!("timed out after {}s", timeout.as_secs())
                    } else {
                        err.to_string()
                    }),
                },
            };
            let success = record.success;
            self.record_attempt(webhook, event, record, attempt as i32, Some(elapsed_ms))
                .await;

            if success {
                delivered = true;
                break;
            }
            warn!(attempt, max_attempts, "Webhook delivery attempt failed");
        }

        if delivered {
            info!(attempts, "Webhook delivered");
        } else {
            warn!(attempts, "Webhook delivery gave up");
        }
        DeliverySummary {
            webhook_id: webhook.id,
            attempts,
            delivered,
        }
    }

    /// Hands the event straight to the projector instead of calling ourselves over HTTP.
    async fn deliver_loopback(&self, webhook: &webhook::Model, event: &FeedEvent) -> DeliverySummary {
        let started = Instant::now();
        let record = match self.projector.project(event).await {
            Ok(_) => AttemptRecord {
                status_code: Some(200),
                response_body: Some("loopback".to_string()),
                success: true,
                error: None,
            },
            Err(err) => AttemptRecord {
                status_code: None,
                response_body: None,
                success: false,
                error: Some(err.to_string()),
            },
        };
        let delivered = record.success;
        let elapsed_ms = started.elapsed().as_millis() as i64;
        self.record_attempt(webhook, event, record, 0, Some(elapsed_ms))
            .await;
        debug!(delivered, "Loopback webhook handled in-process");

        DeliverySummary {
            webhook_id: webhook.id,
            attempts: 1,
            delivered,
        }
    }

    async fn record_attempt(
        &self,
        webhook: &webhook::Model,
        event: &FeedEvent,
        record: AttemptRecord,
        retry_attempt: i32,
        response_time_ms: Option<i64>,
    ) {
        let outcome = if record.success { "success" } else { "failure" };
        counter!("webhook_deliveries_total", "outcome" => outcome).increment(1);

        let payload = serde_json::to_value(event).unwrap_or_default();
        let attempt = DeliveryAttempt {
            webhook_id: webhook.id,
            feed_id: event.feed_id(),
            run_id: event.run_id(),
            event: event.kind().as_str().to_string(),
            payload,
            status_code: record.status_code,
            response_body: record.response_body,
            response_time_ms,
            success: record.success,
            error: record.error,
            retry_attempt,
        };
        if let Err(err) = WebhookDeliveryRepository::new(self.db.clone())
            .insert(self.organization_id, attempt)
            .await
        {
            error!(error = ?err, "Failed to record webhook delivery");
        }

        let (successful, failed) = if record.success { (1, 0) } else { (0, 1) };
        if let Err(err) = WebhookRepository::new(self.db.clone())
            .record_deliveries(webhook.id, successful, failed)
            .await
        {
            error!(error = ?err, "Failed to update webhook counters");
        }
    }
}

struct AttemptRecord {
    status_code: Option<i32>,
    response_body: Option<String>,
    success: bool,
    error: Option<String>,
}

/// True when the URL points at this service's receiver endpoint.
pub fn is_loopback(url: &str) -> bool {
    url::Url::parse(url)
        .map(|parsed| parsed.path().trim_end_matches('/') == RECEIVER_PATH)
        .unwrap_or(false)
}

/// The first `max_chars` characters of a response body.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_urls_are_loopback() {
        assert!(is_loopback("http://localhost:8080/api/v1/feeds/webhook-receiver"));
        assert!(is_loopback("https://feeds.internal/api/v1/feeds/webhook-receiver/"));
        assert!(!is_loopback("https://sink.example/hook"));
        assert!(!is_loopback("https://sink.example/api/v1/feeds/webhook-receiver-v2"));
        assert!(!is_loopback("not a url"));
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("short", 1000), "short");
    }
}
