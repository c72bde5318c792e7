//! Run-history aggregates for a feed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::generation_run::{self, RUN_STATUS_COMPLETED, RUN_STATUS_FAILED};

/// Aggregate statistics over every run of a feed
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FeedAnalytics {
    pub feed_id: Uuid,
    pub total_runs: u64,
    pub completed_runs: u64,
    pub failed_runs: u64,
    /// Completed over terminal runs, 0.0 to 1.0; `None` before the first terminal run
    pub success_rate: Option<f64>,
    pub average_generation_time_ms: Option<f64>,
    pub average_products_included: Option<f64>,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Summarizes `runs`, which may be in any order.
pub fn summarize(feed_id: Uuid, runs: &[generation_run::Model]) -> FeedAnalytics {
    let completed: Vec<&generation_run::Model> = runs
        .iter()
        .filter(|run| run.status == RUN_STATUS_COMPLETED)
        .collect();
    let failed = runs
        .iter()
        .filter(|run| run.status == RUN_STATUS_FAILED)
        .count() as u64;
    let terminal = completed.len() as u64 + failed;

    let durations: Vec<i64> = completed
        .iter()
        .filter_map(|run| run.generation_time_ms)
        .collect();
    let last = runs.iter().max_by_key(|run| run.started_at);

    FeedAnalytics {
        feed_id,
        total_runs: runs.len() as u64,
        completed_runs: completed.len() as u64,
        failed_runs: failed,
        success_rate: (terminal > 0).then(|| completed.len() as f64 / terminal as f64),
        average_generation_time_ms: mean(durations.iter().map(|ms| *ms as f64)),
        average_products_included: mean(completed.iter().map(|run| f64::from(run.products_included))),
        last_run_status: last.map(|run| run.status.clone()),
        last_run_at: last.map(|run| run.started_at.with_timezone(&Utc)),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}
