//! Webhook entity model
//!
//! Outbound subscribers notified after every terminal generation run. A subscriber with a
//! `feed_id` only hears about that feed; one without hears about all feeds.

use std::{fmt, str::FromStr};

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhooks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub feed_id: Option<Uuid>,
    pub url: String,
    /// JSON array of subscribed event names
    #[sea_orm(column_type = "JsonBinary")]
    pub events: JsonValue,
    pub enabled: bool,
    /// Signing secret; unsigned deliveries when absent
    pub secret: Option<String>,
    pub retry_count: i32,
    pub timeout_seconds: i32,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_delivery_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::webhook_delivery::Entity")]
    WebhookDelivery,
}

impl Related<super::webhook_delivery::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookDelivery.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn event_list(&self) -> Vec<WebhookEvent> {
        self.events
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .filter_map(|event| event.as_str().and_then(|name| name.parse().ok()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.event_list().contains(&event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum WebhookEvent {
    #[serde(rename = "feed.generated")]
    FeedGenerated,
    #[serde(rename = "feed.failed")]
    FeedFailed,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::FeedGenerated => "feed.generated",
            WebhookEvent::FeedFailed => "feed.failed",
        }
    }
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEvent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "feed.generated" => Ok(WebhookEvent::FeedGenerated),
            "feed.failed" => Ok(WebhookEvent::FeedFailed),
            other => Err(format!("unknown webhook event '{other}'")),
        }
    }
}
