//! # Feed Schedule Repository

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::feed_schedule::{
    ActiveModel, Column, Entity, Model, SCHEDULE_STATUS_ACTIVE, SCHEDULE_STATUS_FAILED,
    SCHEDULE_STATUS_PAUSED,
};

/// Repository for feed schedules
pub struct ScheduleRepository {
    db: DatabaseConnection,
}

impl ScheduleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_feed(&self, feed_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::FeedId.eq(feed_id))
            .one(&self.db)
            .await
    }

    pub async fn count_enabled(&self, organization_id: Uuid) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::OrganizationId.eq(organization_id))
            .filter(Column::Enabled.eq(true))
            .count(&self.db)
            .await
    }

    /// Creates or replaces the schedule of a feed.
    ///
    /// Saving re-arms the schedule: status returns to `active` (or `paused` when disabled), the
    /// failure counter resets and the next run is one interval from now.
    pub async fn upsert(
        &self,
        organization_id: Uuid,
        feed_id: Uuid,
        enabled: bool,
        interval_hours: i32,
    ) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let status = if enabled {
            SCHEDULE_STATUS_ACTIVE
        } else {
            SCHEDULE_STATUS_PAUSED
        };
        let schedule = ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            feed_id: Set(feed_id),
            enabled: Set(enabled),
            interval_hours: Set(interval_hours),
            next_run_at: Set(now + Duration::hours(i64::from(interval_hours))),
            last_run_at: Set(None),
            status: Set(status.to_string()),
            consecutive_failures: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(schedule)
            .on_conflict(
                OnConflict::column(Column::FeedId)
                    .update_columns([
                        Column::Enabled,
                        Column::IntervalHours,
                        Column::NextRunAt,
                        Column::Status,
                        Column::ConsecutiveFailures,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.find_by_feed(feed_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("schedule for feed {feed_id}")))
    }

    /// Schedules to run at `now`: enabled, active, due. Earliest first.
    pub async fn due(
        &self,
        now: DateTime<FixedOffset>,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Enabled.eq(true))
            .filter(Column::Status.eq(SCHEDULE_STATUS_ACTIVE))
            .filter(Column::NextRunAt.lte(now))
            .order_by_asc(Column::NextRunAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Records a terminal run. The next run is always one interval past `now`.
    pub async fn record_outcome(
        &self,
        schedule: Model,
        now: DateTime<FixedOffset>,
        succeeded: bool,
        max_consecutive_failures: i32,
    ) -> Result<Model, DbErr> {
        let interval = Duration::hours(i64::from(schedule.interval_hours));
        let failures = if succeeded {
            0
        } else {
            schedule.consecutive_failures + 1
        };
        let status = if failures >= max_consecutive_failures {
            SCHEDULE_STATUS_FAILED
        } else {
            schedule.status.as_str()
        }
        .to_string();

        let mut active: ActiveModel = schedule.into();
        active.last_run_at = Set(Some(now));
        active.next_run_at = Set(now + interval);
        active.consecutive_failures = Set(failures);
        active.status = Set(status);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await
    }

    /// Moves the window past `now` without touching the failure count. Used when the feed
    /// was already generating at tick time.
    pub async fn advance(&self, schedule: Model, now: DateTime<FixedOffset>) -> Result<Model, DbErr> {
        let interval = Duration::hours(i64::from(schedule.interval_hours));
        let mut active: ActiveModel = schedule.into();
        active.last_run_at = Set(Some(now));
        active.next_run_at = Set(now + interval);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await
    }
}
