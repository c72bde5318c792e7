//! WebhookDelivery entity model: one row per outbound delivery attempt.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_deliveries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub webhook_id: Uuid,
    pub feed_id: Uuid,
    pub run_id: Option<Uuid>,
    pub event: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,
    pub status_code: Option<i32>,
    /// First characters of the response body
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub success: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    /// Zero-based attempt index within one dispatch
    pub retry_attempt: i32,
    pub delivered_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhook::Entity",
        from = "Column::WebhookId",
        to = "super::webhook::Column::Id"
    )]
    Webhook,
}

impl Related<super::webhook::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Webhook.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
