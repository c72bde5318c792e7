//! # Inventory Level Repository

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::inventory_level::{ActiveModel, Column, Entity};

/// Repository for per-location inventory levels
pub struct InventoryRepository {
    db: DatabaseConnection,
}

impl InventoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Writes the stock of one item at one location.
    pub async fn upsert_level(
        &self,
        organization_id: Uuid,
        connector_id: Uuid,
        inventory_item_id: &str,
        location_id: &str,
        available: i64,
    ) -> Result<(), DbErr> {
        let level = ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            connector_id: Set(connector_id),
            inventory_item_id: Set(inventory_item_id.to_string()),
            location_id: Set(location_id.to_string()),
            available_quantity: Set(available.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
            last_updated: Set(Utc::now().fixed_offset()),
        };

        Entity::insert(level)
            .on_conflict(
                OnConflict::columns([
                    Column::ConnectorId,
                    Column::InventoryItemId,
                    Column::LocationId,
                ])
                .update_columns([Column::AvailableQuantity, Column::LastUpdated])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn delete_level(
        &self,
        connector_id: Uuid,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<(), DbErr> {
        Entity::delete_many()
            .filter(Column::ConnectorId.eq(connector_id))
            .filter(Column::InventoryItemId.eq(inventory_item_id))
            .filter(Column::LocationId.eq(location_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Stock of an item summed over every location.
    pub async fn total_for_item(
        &self,
        connector_id: Uuid,
        inventory_item_id: &str,
    ) -> Result<i64, DbErr> {
        let levels = Entity::find()
            .filter(Column::ConnectorId.eq(connector_id))
            .filter(Column::InventoryItemId.eq(inventory_item_id))
            .all(&self.db)
            .await?;
        Ok(levels
            .iter()
            .map(|level| i64::from(level.available_quantity))
            .sum())
    }
}
