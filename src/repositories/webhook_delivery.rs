//! # Webhook Delivery Repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::webhook_delivery::{ActiveModel, Column, Entity, Model};

/// One attempt, as recorded in the delivery log
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub webhook_id: Uuid,
    pub feed_id: Uuid,
    pub run_id: Option<Uuid>,
    pub event: String,
    pub payload: JsonValue,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub success: bool,
    pub error: Option<String>,
    pub retry_attempt: i32,
}

/// Repository for the delivery log
pub struct WebhookDeliveryRepository {
    db: DatabaseConnection,
}

impl WebhookDeliveryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(
        &self,
        organization_id: Uuid,
        attempt: DeliveryAttempt,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            webhook_id: Set(attempt.webhook_id),
            feed_id: Set(attempt.feed_id),
            run_id: Set(attempt.run_id),
            event: Set(attempt.event),
            payload: Set(attempt.payload),
            status_code: Set(attempt.status_code),
            response_body: Set(attempt.response_body),
            response_time_ms: Set(attempt.response_time_ms),
            success: Set(attempt.success),
            error: Set(attempt.error),
            retry_attempt: Set(attempt.retry_attempt),
            delivered_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await
    }

    /// Latest deliveries of a feed first.
    pub async fn list_by_feed(
        &self,
        feed_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Model>, u64), DbErr> {
        let paginator = Entity::find()
            .filter(Column::FeedId.eq(feed_id))
            .order_by_desc(Column::DeliveredAt)
            .order_by_desc(Column::RetryAttempt)
            .paginate(&self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let deliveries = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((deliveries, total))
    }

    pub async fn list_by_webhook(&self, webhook_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::WebhookId.eq(webhook_id))
            .order_by_asc(Column::DeliveredAt)
            .order_by_asc(Column::RetryAttempt)
            .all(&self.db)
            .await
    }
}
