//! # Notification Projector
//!
//! Turns regeneration events into short UI messages and expires old ones.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::{DatabaseConnection, DbErr};
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::events::FeedEvent;
use crate::models::notification;
use crate::repositories::NotificationRepository;
use crate::repositories::notification::NewNotification;

pub const NOTIFICATION_FEED_GENERATED: &str = "feed_generated";
pub const NOTIFICATION_FEED_FAILED: &str = "feed_failed";
pub const PRIORITY_NORMAL: &str = "normal";
pub const PRIORITY_HIGH: &str = "high";

/// Read notifications are dropped after this long.
pub const READ_RETENTION_DAYS: i64 = 30;
/// Unread `feed_generated` notifications are dropped after this long.
pub const UNREAD_GENERATED_RETENTION_DAYS: i64 = 7;

/// Writes notifications for feed events
pub struct NotificationProjector {
    repo: NotificationRepository,
    organization_id: Uuid,
}

impl NotificationProjector {
    pub fn new(db: DatabaseConnection, organization_id: Uuid) -> Self {
        Self {
            repo: NotificationRepository::new(db),
            organization_id,
        }
    }

    #[instrument(skip_all, fields(feed_id = %event.feed_id()))]
    pub async fn project(&self, event: &FeedEvent) -> Result<notification::Model, DbErr> {
        let notification = self
            .repo
            .insert(self.organization_id, describe(event, Utc::now().fixed_offset()))
            .await?;
        debug!(notification_id = %notification.id, "Notification recorded");
        Ok(notification)
    }

    pub async fn purge_expired(&self, now: DateTime<FixedOffset>) -> Result<u64, DbErr> {
        self.repo
            .purge_expired(
                now,
                Duration::days(READ_RETENTION_DAYS),
                NOTIFICATION_FEED_GENERATED,
                Duration::days(UNREAD_GENERATED_RETENTION_DAYS),
            )
            .await
    }
}

/// The notification an event projects to.
pub fn describe(event: &FeedEvent, now: DateTime<FixedOffset>) -> NewNotification {
    match event {
        FeedEvent::Generated {
            feed_id,
            feed_name,
            run_id,
            products_included,
            generation_time_ms,
            file_size_bytes,
            ..
        } => NewNotification {
            notification_type: NOTIFICATION_FEED_GENERATED.to_string(),
            title: format!("Feed \"{feed_name}\" generated"),
            message: format!(
                "Successfully generated {} products in {:.1}s",
                products_included,
                *generation_time_ms as f64 / 1000.0
            ),
            priority: PRIORITY_NORMAL.to_string(),
            entity_type: Some("feed".to_string()),
            entity_id: Some(*feed_id),
            entity_name: Some(feed_name.clone()),
            metadata: Some(json!({
                "run_id": run_id,
                "products_included": products_included,
                "file_size_bytes": file_size_bytes,
            })),
            expires_at: Some(now + Duration::days(UNREAD_GENERATED_RETENTION_DAYS)),
        },
        FeedEvent::Failed {
            feed_id,
            feed_name,
            run_id,
            error,
            ..
        } => NewNotification {
            notification_type: NOTIFICATION_FEED_FAILED.to_string(),
            title: format!("Feed \"{feed_name}\" failed"),
            message: format!("Feed generation failed: {error}"),
            priority: PRIORITY_HIGH.to_string(),
            entity_type: Some("feed".to_string()),
            entity_id: Some(*feed_id),
            entity_name: Some(feed_name.clone()),
            metadata: Some(json!({ "run_id": run_id, "error": error })),
            expires_at: Some(now + Duration::days(READ_RETENTION_DAYS)),
        },
    }
}
