//! # Generation Run Repository
//!
//! Runs are inserted `started` and finished exactly once: every terminal update is guarded by
//! `status = 'started'`, so a late writer cannot overwrite a run the reaper already failed.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::generation_run::{
    ActiveModel, Column, Entity, Model, RUN_STATUS_COMPLETED, RUN_STATUS_FAILED,
    RUN_STATUS_STARTED,
};

pub const ABANDONED_RUN_MESSAGE: &str = "generation abandoned";

/// Statistics of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub products_processed: i32,
    pub products_included: i32,
    pub products_excluded: i32,
    pub generation_time_ms: i64,
    pub file_size_bytes: i64,
    pub file_url: Option<String>,
    pub validation_issues: Option<JsonValue>,
}

/// Repository for generation runs
pub struct GenerationRunRepository {
    db: DatabaseConnection,
}

impl GenerationRunRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn start(
        &self,
        organization_id: Uuid,
        feed_id: Uuid,
        file_format: &str,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            feed_id: Set(feed_id),
            status: Set(RUN_STATUS_STARTED.to_string()),
            products_processed: Set(0),
            products_included: Set(0),
            products_excluded: Set(0),
            generation_time_ms: Set(None),
            file_size_bytes: Set(None),
            file_url: Set(None),
            file_format: Set(file_format.to_string()),
            error_message: Set(None),
            validation_issues: Set(None),
            started_at: Set(Utc::now().fixed_offset()),
            completed_at: Set(None),
        }
        .insert(&self.db)
        .await
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&self.db).await
    }

    /// Returns false when the run was no longer `started`.
    pub async fn complete(&self, run_id: Uuid, stats: RunStats) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(RUN_STATUS_COMPLETED))
            .col_expr(Column::ProductsProcessed, Expr::value(stats.products_processed))
            .col_expr(Column::ProductsIncluded, Expr::value(stats.products_included))
            .col_expr(Column::ProductsExcluded, Expr::value(stats.products_excluded))
            .col_expr(Column::GenerationTimeMs, Expr::value(stats.generation_time_ms))
            .col_expr(Column::FileSizeBytes, Expr::value(stats.file_size_bytes))
            .col_expr(Column::FileUrl, Expr::value(stats.file_url))
            .col_expr(Column::ValidationIssues, Expr::value(stats.validation_issues))
            .col_expr(Column::CompletedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(run_id))
            .filter(Column::Status.eq(RUN_STATUS_STARTED))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Returns false when the run was no longer `started`.
    pub async fn fail(
        &self,
        run_id: Uuid,
        error_message: &str,
        generation_time_ms: i64,
    ) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(RUN_STATUS_FAILED))
            .col_expr(Column::ErrorMessage, Expr::value(error_message))
            .col_expr(Column::GenerationTimeMs, Expr::value(generation_time_ms))
            .col_expr(Column::CompletedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(run_id))
            .filter(Column::Status.eq(RUN_STATUS_STARTED))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// A page of a feed's runs, newest first, with the total count.
    pub async fn list_by_feed(
        &self,
        feed_id: Uuid,
        status: Option<&str>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Model>, u64), DbErr> {
        let mut query = Entity::find().filter(Column::FeedId.eq(feed_id));
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        let paginator = query
            .order_by_desc(Column::StartedAt)
            .order_by_desc(Column::Id)
            .paginate(&self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let runs = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((runs, total))
    }

    pub async fn all_for_feed(&self, feed_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::FeedId.eq(feed_id))
            .order_by_desc(Column::StartedAt)
            .all(&self.db)
            .await
    }

    /// Fails runs stuck in `started` since before `now - stale_after`; returns their feed ids.
    pub async fn reap_stale(
        &self,
        now: DateTime<FixedOffset>,
        stale_after: Duration,
    ) -> Result<Vec<Uuid>, DbErr> {
        let cutoff = now - stale_after;
        let stale = Entity::find()
            .filter(Column::Status.eq(RUN_STATUS_STARTED))
            .filter(Column::StartedAt.lt(cutoff))
            .all(&self.db)
            .await?;

        let mut feed_ids = Vec::with_capacity(stale.len());
        for run in stale {
            let elapsed_ms = (now - run.started_at).num_milliseconds();
            if self.fail(run.id, ABANDONED_RUN_MESSAGE, elapsed_ms).await? {
                tracing::warn!(run_id = %run.id, feed_id = %run.feed_id, "Reaped stale generation run");
                feed_ids.push(run.feed_id);
            }
        }
        Ok(feed_ids)
    }
}
