//! Creates the products table, keyed for upsert on `(connector_id, external_id)`.

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
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Products::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Products::ConnectorId).uuid().not_null())
                    .col(ColumnDef::new(Products::ExternalId).text().not_null())
                    .col(ColumnDef::new(Products::Title).text().not_null())
                    .col(ColumnDef::new(Products::Description).text().null())
                    .col(
                        ColumnDef::new(Products::Price)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Products::Currency).text().not_null())
                    .col(ColumnDef::new(Products::Sku).text().null())
                    .col(ColumnDef::new(Products::Brand).text().null())
                    .col(ColumnDef::new(Products::Category).text().null())
                    .col(ColumnDef::new(Products::Images).json_binary().not_null())
                    .col(ColumnDef::new(Products::Variants).json_binary().not_null())
                    .col(ColumnDef::new(Products::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Products::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_connector_id")
                            .from(Products::Table, Products::ConnectorId)
                            .to(Connectors::Table, Connectors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_products_connector_external")
                    .table(Products::Table)
                    .col(Products::ConnectorId)
                    .col(Products::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Feed selection scans by organization and status, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_products_org_status_created")
                    .table(Products::Table)
                    .col(Products::OrganizationId)
                    .col(Products::Status)
                    .col(Products::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_products_org_status_created").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("uq_products_connector_external").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    OrganizationId,
    ConnectorId,
    ExternalId,
    Title,
    Description,
    Price,
    Currency,
    Sku,
    Brand,
    Category,
    Images,
    Variants,
    Metadata,
    Status,
    CreatedAt,
    UpdatedAt,
}
