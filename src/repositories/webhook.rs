//! # Webhook Repository
//!
//! Outbound subscribers and their delivery counters. Counters are bumped with
//! `SET col = col + n` so concurrent dispatches never lose an increment.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::webhook::{ActiveModel, Column, Entity, Model, WebhookEvent};

pub const DEFAULT_RETRY_COUNT: i32 = 3;
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 10;

/// Subscriber settings of a feed
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub enabled: bool,
    pub secret: Option<String>,
    pub retry_count: Option<i32>,
    pub timeout_seconds: Option<i32>,
}

/// Repository for outbound webhooks
pub struct WebhookRepository {
    db: DatabaseConnection,
}

impl WebhookRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_for_feed(&self, feed_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::FeedId.eq(feed_id))
            .order_by_asc(Column::CreatedAt)
            .one(&self.db)
            .await
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&self.db).await
    }

    /// Creates the feed's webhook or updates the existing one. Counters are kept on update.
    pub async fn upsert_for_feed(
        &self,
        organization_id: Uuid,
        feed_id: Uuid,
        settings: WebhookSettings,
    ) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let events = JsonValue::Array(
            settings
                .events
                .iter()
                .map(|event| JsonValue::String(event.as_str().to_string()))
                .collect(),
        );

        match self.find_for_feed(feed_id).await? {
            Some(existing) => {
                let retry_count = settings.retry_count.unwrap_or(existing.retry_count);
                let timeout_seconds = settings.timeout_seconds.unwrap_or(existing.timeout_seconds);
                let mut active: ActiveModel = existing.into();
                active.url = Set(settings.url);
                active.events = Set(events);
                active.enabled = Set(settings.enabled);
                active.secret = Set(settings.secret);
                active.retry_count = Set(retry_count);
                active.timeout_seconds = Set(timeout_seconds);
                active.updated_at = Set(now);
                active.update(&self.db).await
            }
            None => {
                ActiveModel {
                    id: Set(Uuid::new_v4()),
                    organization_id: Set(organization_id),
                    feed_id: Set(Some(feed_id)),
                    url: Set(settings.url),
                    events: Set(events),
                    enabled: Set(settings.enabled),
                    secret: Set(settings.secret),
                    retry_count: Set(settings.retry_count.unwrap_or(DEFAULT_RETRY_COUNT)),
                    timeout_seconds: Set(settings
                        .timeout_seconds
                        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
                    total_deliveries: Set(0),
                    successful_deliveries: Set(0),
                    failed_deliveries: Set(0),
                    last_delivery_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.db)
                .await
            }
        }
    }

    /// Enabled webhooks of the feed or of the whole organization that subscribe to `event`.
    pub async fn subscribers(
        &self,
        organization_id: Uuid,
        feed_id: Uuid,
        event: WebhookEvent,
    ) -> Result<Vec<Model>, DbErr> {
        let webhooks = Entity::find()
            .filter(Column::OrganizationId.eq(organization_id))
            .filter(Column::Enabled.eq(true))
            .filter(
                Condition::any()
                    .add(Column::FeedId.eq(feed_id))
                    .add(Column::FeedId.is_null()),
            )
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(webhooks
            .into_iter()
            .filter(|webhook| webhook.subscribes_to(event))
            .collect())
    }

    /// Adds delivery outcomes to the aggregate counters.
    pub async fn record_deliveries(
        &self,
        webhook_id: Uuid,
        successful: i64,
        failed: i64,
    ) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(
                Column::TotalDeliveries,
                Expr::col(Column::TotalDeliveries).add(successful + failed),
            )
            .col_expr(
                Column::SuccessfulDeliveries,
                Expr::col(Column::SuccessfulDeliveries).add(successful),
            )
            .col_expr(
                Column::FailedDeliveries,
                Expr::col(Column::FailedDeliveries).add(failed),
            )
            .col_expr(Column::LastDeliveryAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(webhook_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
