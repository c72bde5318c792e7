//! # Organization Repository
//!
//! Resolves the single organization the service runs against.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use uuid::Uuid;

use crate::models::organization::{self, ActiveModel, Entity, Model};

pub const DEFAULT_ORGANIZATION_NAME: &str = "Default Organization";

/// Repository for organization database operations
pub struct OrganizationRepository {
    db: DatabaseConnection,
}

impl OrganizationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the oldest organization, creating the default one on an empty database.
    pub async fn ensure_default(&self) -> Result<Model, sea_orm::DbErr> {
        if let Some(existing) = Entity::find()
            .order_by_asc(organization::Column::CreatedAt)
            .one(&self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now().fixed_offset();
        let created = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(DEFAULT_ORGANIZATION_NAME.to_string()),
            settings: Set(Some(serde_json::json!({}))),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(organization_id = %created.id, "Created default organization");
        Ok(created)
    }
}
