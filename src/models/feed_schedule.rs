//! FeedSchedule entity model: the auto-regeneration policy of one feed.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "feed_schedules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Unique: one schedule per feed
    pub feed_id: Uuid,
    pub enabled: bool,
    pub interval_hours: i32,
    pub next_run_at: DateTimeWithTimeZone,
    pub last_run_at: Option<DateTimeWithTimeZone>,
    /// active|paused|failed
    pub status: String,
    pub consecutive_failures: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
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

pub const SCHEDULE_STATUS_ACTIVE: &str = "active";
pub const SCHEDULE_STATUS_PAUSED: &str = "paused";
pub const SCHEDULE_STATUS_FAILED: &str = "failed";
