//! Terminal regeneration events, as delivered to outbound webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::webhook::WebhookEvent;

/// Webhook payload; serializes with an `event` tag of `feed.generated` or `feed.failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event")]
pub enum FeedEvent {
    #[serde(rename = "feed.generated")]
    Generated {
        feed_id: Uuid,
        feed_name: String,
        channel: String,
        format: String,
        #[serde(default)]
        run_id: Option<Uuid>,
        products_included: i64,
        products_excluded: i64,
        generation_time_ms: i64,
        file_size_bytes: i64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "feed.failed")]
    Failed {
        feed_id: Uuid,
        feed_name: String,
        channel: String,
        #[serde(default)]
        run_id: Option<Uuid>,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    pub fn kind(&self) -> WebhookEvent {
        match self {
            FeedEvent::Generated { .. } => WebhookEvent::FeedGenerated,
            FeedEvent::Failed { .. } => WebhookEvent::FeedFailed,
        }
    }

    pub fn feed_id(&self) -> Uuid {
        match self {
            FeedEvent::Generated { feed_id, .. } | FeedEvent::Failed { feed_id, .. } => *feed_id,
        }
    }

    pub fn feed_name(&self) -> &str {
        match self {
            FeedEvent::Generated { feed_name, .. } | FeedEvent::Failed { feed_name, .. } => {
                feed_name
            }
        }
    }

    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            FeedEvent::Generated { run_id, .. } | FeedEvent::Failed { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn payload_carries_event_tag_and_stats() {
        let event = FeedEvent::Generated {
            feed_id: Uuid::nil(),
            feed_name: "G1".into(),
            channel: "google".into(),
            format: "xml".into(),
            run_id: None,
            products_included: 3,
            products_excluded: 1,
            generation_time_ms: 120,
            file_size_bytes: 2048,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "feed.generated");
        assert_eq!(value["products_included"], 3);
        assert_eq!(value["timestamp"], "2025-01-01T00:00:00Z");

        let back: FeedEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), WebhookEvent::FeedGenerated);
    }

    #[test]
    fn failure_payload_has_error() {
        let value = serde_json::json!({
            "event": "feed.failed",
            "feed_id": Uuid::nil(),
            "feed_name": "G1",
            "channel": "google",
            "error": "boom",
            "timestamp": "2025-01-01T00:00:00Z"
        });
        let event: FeedEvent = serde_json::from_value(value).unwrap();
        assert_eq!(event.kind(), WebhookEvent::FeedFailed);
        assert_eq!(event.run_id(), None);
    }
}
