//! # Notification Repository

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::notification::{ActiveModel, Column, Entity, Model};

/// Fields of a new notification
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub priority: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub entity_name: Option<String>,
    pub metadata: Option<JsonValue>,
    pub expires_at: Option<DateTime<FixedOffset>>,
}

/// Repository for UI notifications
pub struct NotificationRepository {
    db: DatabaseConnection,
}

impl NotificationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(
        &self,
        organization_id: Uuid,
        new: NewNotification,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            notification_type: Set(new.notification_type),
            title: Set(new.title),
            message: Set(new.message),
            priority: Set(new.priority),
            entity_type: Set(new.entity_type),
            entity_id: Set(new.entity_id),
            entity_name: Set(new.entity_name),
            metadata: Set(new.metadata),
            read: Set(false),
            read_at: Set(None),
            expires_at: Set(new.expires_at),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await
    }

    pub async fn list(
        &self,
        organization_id: Uuid,
        unread_only: bool,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Model>, u64), DbErr> {
        let mut query = Entity::find().filter(Column::OrganizationId.eq(organization_id));
        if unread_only {
            query = query.filter(Column::Read.eq(false));
        }
        let paginator = query
            .order_by_desc(Column::CreatedAt)
            .paginate(&self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn mark_read(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Model>, DbErr> {
        let Some(notification) = Entity::find_by_id(id)
            .filter(Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        if notification.read {
            return Ok(Some(notification));
        }

        let mut active: ActiveModel = notification.into();
        active.read = Set(true);
        active.read_at = Set(Some(Utc::now().fixed_offset()));
        active.update(&self.db).await.map(Some)
    }

    /// Deletes read notifications older than `read_ttl` and unread ones of
    /// `unread_type` older than `unread_ttl`.
    pub async fn purge_expired(
        &self,
        now: DateTime<FixedOffset>,
        read_ttl: Duration,
        unread_type: &str,
        unread_ttl: Duration,
    ) -> Result<u64, DbErr> {
        let read_and_old = Condition::all()
            .add(Column::Read.eq(true))
            .add(Column::CreatedAt.lt(now - read_ttl));
        let unread_and_old = Condition::all()
            .add(Column::Read.eq(false))
            .add(Column::NotificationType.eq(unread_type))
            .add(Column::CreatedAt.lt(now - unread_ttl));
        let result = Entity::delete_many()
            .filter(Condition::any().add(read_and_old).add(unread_and_old))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
