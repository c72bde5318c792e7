//! # Feed Repository
//!
//! Feed definitions plus the `generating` status transition that serializes runs per feed.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::filter::FeedFilter;
use crate::models::feed::{
    ActiveModel, Column, Entity, FEED_STATUS_ACTIVE, FEED_STATUS_ERROR, FEED_STATUS_GENERATING,
    FeedChannel, FeedFormat, Model,
};

/// Fields of a new feed
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub channel: FeedChannel,
    pub format: FeedFormat,
    pub connector_id: Option<Uuid>,
    pub filter: FeedFilter,
}

/// Partial update; `None` leaves a field unchanged. `connector_id: Some(None)` clears the scope.
#[derive(Debug, Clone, Default)]
pub struct FeedChanges {
    pub name: Option<String>,
    pub channel: Option<FeedChannel>,
    pub format: Option<FeedFormat>,
    pub connector_id: Option<Option<Uuid>>,
    pub filter: Option<FeedFilter>,
}

/// Repository for feed database operations
pub struct FeedRepository {
    db: DatabaseConnection,
}

impl FeedRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, organization_id: Uuid, new: NewFeed) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            connector_id: Set(new.connector_id),
            name: Set(new.name),
            channel: Set(new.channel.as_str().to_string()),
            format: Set(new.format.as_str().to_string()),
            settings: Set(settings_document(&new.filter)?),
            status: Set(FEED_STATUS_ACTIVE.to_string()),
            products_count: Set(0),
            last_generated: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
    }

    pub async fn find(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id)
            .filter(Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await
    }

    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::OrganizationId.eq(organization_id))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn update(&self, feed: Model, changes: FeedChanges) -> Result<Model, DbErr> {
        let settings = match &changes.filter {
            Some(filter) => {
                let mut settings = feed.settings.clone();
                merge_filter(&mut settings, filter)?;
                Some(settings)
            }
            None => None,
        };

        let mut active: ActiveModel = feed.into();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(channel) = changes.channel {
            active.channel = Set(channel.as_str().to_string());
        }
        if let Some(format) = changes.format {
            active.format = Set(format.as_str().to_string());
        }
        if let Some(connector_id) = changes.connector_id {
            active.connector_id = Set(connector_id);
        }
        if let Some(settings) = settings {
            active.settings = Set(settings);
        }
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await
    }

    /// Deletes the feed; schedules and runs go with it through cascading keys.
    pub async fn delete(&self, organization_id: Uuid, id: Uuid) -> Result<bool, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::OrganizationId.eq(organization_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Moves the feed to `generating` unless it is already there.
    ///
    /// A single conditional UPDATE, so of two racing callers exactly one sees a row affected.
    pub async fn try_lock(&self, feed_id: Uuid) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(FEED_STATUS_GENERATING))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(feed_id))
            .filter(Column::Status.ne(FEED_STATUS_GENERATING))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Releases the lock after a successful run and records its product count.
    pub async fn mark_generated(&self, feed_id: Uuid, products_count: i32) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(FEED_STATUS_ACTIVE))
            .col_expr(Column::ProductsCount, Expr::value(products_count))
            .col_expr(Column::LastGenerated, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(feed_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Releases the lock after a failed run.
    pub async fn mark_error(&self, feed_id: Uuid) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(FEED_STATUS_ERROR))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(feed_id))
            .filter(Column::Status.eq(FEED_STATUS_GENERATING))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

fn settings_document(filter: &FeedFilter) -> Result<JsonValue, DbErr> {
    let mut settings = json!({});
    merge_filter(&mut settings, filter)?;
    Ok(settings)
}

fn merge_filter(settings: &mut JsonValue, filter: &FeedFilter) -> Result<(), DbErr> {
    let filter = serde_json::to_value(filter).map_err(|e| DbErr::Json(e.to_string()))?;
    match settings {
        JsonValue::Object(map) => {
            map.insert("filter".to_string(), filter);
        }
        other => *other = json!({ "filter": filter }),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn filter_is_stored_under_settings_key() {
        let filter = FeedFilter {
            min_price: Some(Decimal::new(10, 0)),
            ..Default::default()
        };
        let settings = settings_document(&filter).unwrap();
        assert_eq!(settings["filter"]["min_price"], "10");
    }

    #[test]
    fn merging_keeps_other_settings() {
        let mut settings = json!({"title_template": "{title}"});
        merge_filter(&mut settings, &FeedFilter::default()).unwrap();
        assert_eq!(settings["title_template"], "{title}");
        assert!(settings["filter"].is_object());
    }
}
