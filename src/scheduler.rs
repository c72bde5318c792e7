//! # Feed Scheduler
//!
//! Tick-driven regeneration of feeds whose schedule is due. A tick selects
//! `enabled AND status = 'active' AND next_run_at <= now` (earliest first, bounded by the batch
//! limit), runs each feed to completion and moves `next_run_at` one interval past the tick.
//! Consecutive failures pause a schedule as `failed`. Each tick also reaps runs abandoned in
//! `started` and purges expired notifications.
//!
//! Single-process by design: concurrent schedulers would both select the same rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::feeds::FeedManager;
use crate::models::feed_schedule::{self, SCHEDULE_STATUS_FAILED};
use crate::notifications::NotificationProjector;
use crate::repositories::{FeedRepository, GenerationRunRepository, ScheduleRepository};

pub const MIN_INTERVAL_HOURS: i32 = 1;
pub const MAX_INTERVAL_HOURS: i32 = 24 * 30;

/// What one tick did
#[derive(Debug, Default, Clone, Serialize, ToSchema)]
pub struct TickReport {
    pub selected: u64,
    pub completed: u64,
    pub failed: u64,
    /// Feeds skipped because a run was already in flight
    pub skipped_in_flight: u64,
    /// Schedules that reached the failure limit on this tick
    pub paused: u64,
    pub reaped_runs: u64,
    pub purged_notifications: u64,
}

pub struct FeedScheduler {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    organization_id: Uuid,
    feeds: FeedManager,
    projector: Arc<NotificationProjector>,
}

impl FeedScheduler {
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        organization_id: Uuid,
        feeds: FeedManager,
        projector: Arc<NotificationProjector>,
    ) -> Self {
        Self {
            config,
            db,
            organization_id,
            feeds,
            projector,
        }
    }

    fn schedules(&self) -> ScheduleRepository {
        ScheduleRepository::new(self.db.clone())
    }

    /// Runs ticks until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.scheduler.tick_interval_seconds,
            "Starting feed scheduler"
        );
        let tick_interval = self.config.scheduler.tick_interval();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Feed scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    if let Err(err) = self.tick(Utc::now().fixed_offset()).await {
                        error!(error = ?err, "Scheduler tick failed");
                    }
                }
            }
        }

        info!("Feed scheduler stopped");
    }

    /// Processes everything due at `now`. Safe to call repeatedly: a schedule that ran
    /// is not due again until its next interval.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn tick(&self, now: DateTime<FixedOffset>) -> Result<TickReport, PipelineError> {
        let tick_started = Instant::now();
        let mut report = TickReport::default();

        report.reaped_runs = self.reap_stale_runs(now).await?;

        let due = self
            .schedules()
            .due(now, self.config.scheduler.batch_limit)
            .await?;
        report.selected = due.len() as u64;
        counter!("scheduler_schedules_selected_total").increment(report.selected);

        for schedule in due {
            let feed_id = schedule.feed_id;
            match self.feeds.regenerate_and_wait(feed_id).await {
                Ok(outcome) => {
                    if outcome.succeeded {
                        report.completed += 1;
                    } else {
                        report.failed += 1;
                    }
                    report.paused += u64::from(self.record(schedule, now, outcome.succeeded).await);
                }
                Err(PipelineError::ConcurrentRun { .. }) => {
                    debug!(feed_id = %feed_id, "Feed already generating; window skipped");
                    report.skipped_in_flight += 1;
                    if let Err(err) = self.schedules().advance(schedule, now).await {
                        warn!(feed_id = %feed_id, error = %err, "Failed to advance skipped schedule");
                    }
                }
                Err(err) => {
                    warn!(feed_id = %feed_id, error = %err, "Scheduled regeneration could not start");
                    report.failed += 1;
                    report.paused += u64::from(self.record(schedule, now, false).await);
                }
            }
        }

        match self.projector.purge_expired(now).await {
            Ok(purged) => report.purged_notifications = purged,
            Err(err) => error!(error = ?err, "Failed to purge expired notifications"),
        }

        histogram!("scheduler_tick_duration_ms")
            .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
        info!(
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            skipped_in_flight = report.skipped_in_flight,
            reaped_runs = report.reaped_runs,
            "Scheduler tick completed"
        );
        Ok(report)
    }

    /// Writes the run outcome; returns true when this failure paused the schedule. A write
    /// failure is logged so the rest of the batch still runs.
    async fn record(
        &self,
        schedule: feed_schedule::Model,
        now: DateTime<FixedOffset>,
        succeeded: bool,
    ) -> bool {
        let was_failed = schedule.status == SCHEDULE_STATUS_FAILED;
        let feed_id = schedule.feed_id;
        let updated = match self
            .schedules()
            .record_outcome(
                schedule,
                now,
                succeeded,
                self.config.scheduler.max_consecutive_failures,
            )
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                warn!(feed_id = %feed_id, error = %err, "Failed to record scheduled run outcome");
                return false;
            }
        };
        let paused = !was_failed && updated.status == SCHEDULE_STATUS_FAILED;
        if paused {
            counter!("scheduler_schedules_paused_total").increment(1);
            warn!(
                feed_id = %updated.feed_id,
                consecutive_failures = updated.consecutive_failures,
                "Schedule paused after consecutive failures"
            );
        }
        paused
    }

    async fn reap_stale_runs(&self, now: DateTime<FixedOffset>) -> Result<u64, PipelineError> {
        let stale_after = Duration::minutes(self.config.scheduler.stale_run_minutes);
        let feed_ids = GenerationRunRepository::new(self.db.clone())
            .reap_stale(now, stale_after)
            .await?;
        let feeds = FeedRepository::new(self.db.clone());
        for feed_id in &feed_ids {
            feeds.mark_error(*feed_id).await?;
        }
        Ok(feed_ids.len() as u64)
    }

    pub async fn get_schedule(&self, feed_id: Uuid) -> Result<feed_schedule::Model, PipelineError> {
        let feed = self.feeds.get(feed_id).await?;
        self.schedules()
            .find_by_feed(feed.id)
            .await?
            .ok_or_else(|| PipelineError::not_found("schedule", feed_id))
    }

    /// Creates or replaces a feed's schedule.
    ///
    /// Enabling a schedule fails with `ScheduleCapacity` once the organization has the
    /// configured maximum of enabled schedules.
    pub async fn configure(
        &self,
        feed_id: Uuid,
        enabled: bool,
        interval_hours: i32,
    ) -> Result<feed_schedule::Model, PipelineError> {
        if !(MIN_INTERVAL_HOURS..=MAX_INTERVAL_HOURS).contains(&interval_hours) {
            return Err(PipelineError::BadPayload(format!(
                "interval_hours must be between {MIN_INTERVAL_HOURS} and {MAX_INTERVAL_HOURS}"
            )));
        }
        let feed = self.feeds.get(feed_id).await?;
        let schedules = self.schedules();
        let existing = schedules.find_by_feed(feed.id).await?;

        if enabled && !existing.as_ref().is_some_and(|s| s.enabled) {
            let limit = self.config.scheduler.max_enabled_schedules;
            if schedules.count_enabled(self.organization_id).await? >= limit {
                return Err(PipelineError::ScheduleCapacity { limit });
            }
        }

        let schedule = schedules
            .upsert(self.organization_id, feed.id, enabled, interval_hours)
            .await?;
        info!(
            feed_id = %feed.id,
            enabled,
            interval_hours,
            next_run_at = %schedule.next_run_at,
            "Schedule saved"
        );
        Ok(schedule)
    }
}
