//! GenerationRun entity model
//!
//! One row per regeneration attempt. Rows are inserted as `started` before any product is
//! selected and move exactly once to `completed` or `failed`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "generation_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub feed_id: Uuid,
    /// started|completed|failed
    pub status: String,
    pub products_processed: i32,
    pub products_included: i32,
    pub products_excluded: i32,
    pub generation_time_ms: Option<i64>,
    pub file_size_bytes: Option<i64>,
    pub file_url: Option<String>,
    pub file_format: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    /// Per-product required-field issues found while rendering
    #[sea_orm(column_type = "JsonBinary")]
    pub validation_issues: Option<JsonValue>,
    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::feed::Entity",
        from = "Column::FeedId",
        to = "super::feed::Column::Id"
    )]
    Feed,
}

impl Related<super::feed::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Feed.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub const RUN_STATUS_STARTED: &str = "started";
pub const RUN_STATUS_COMPLETED: &str = "completed";
pub const RUN_STATUS_FAILED: &str = "failed";
