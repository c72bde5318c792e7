//! Creates per-location inventory levels.

use sea_orm_migration::prelude::*;

use crate::m2025_01_10_000100_create_connectors::Connectors;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InventoryLevels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryLevels::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InventoryLevels::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(InventoryLevels::ConnectorId).uuid().not_null())
                    .col(ColumnDef::new(InventoryLevels::InventoryItemId).text().not_null())
                    .col(ColumnDef::new(InventoryLevels::LocationId).text().not_null())
                    .col(
                        ColumnDef::new(InventoryLevels::AvailableQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InventoryLevels::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_inventory_levels_connector_id")
                            .from(InventoryLevels::Table, InventoryLevels::ConnectorId)
                            .to(Connectors::Table, Connectors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_inventory_levels_item_location")
                    .table(InventoryLevels::Table)
                    .col(InventoryLevels::ConnectorId)
                    .col(InventoryLevels::InventoryItemId)
                    .col(InventoryLevels::LocationId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uq_inventory_levels_item_location")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(InventoryLevels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InventoryLevels {
    Table,
    Id,
    OrganizationId,
    ConnectorId,
    InventoryItemId,
    LocationId,
    AvailableQuantity,
    LastUpdated,
}
