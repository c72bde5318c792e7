//! Creates the connectors table: one row per external product source.

use sea_orm_migration::prelude::*;

use crate::m2025_01_10_000001_create_organizations::Organizations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connectors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Connectors::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Connectors::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Connectors::Kind).text().not_null())
                    .col(ColumnDef::new(Connectors::ShopDomain).text().not_null())
                    .col(
                        ColumnDef::new(Connectors::CredentialsCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(ColumnDef::new(Connectors::Currency).text().null())
                    .col(
                        ColumnDef::new(Connectors::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Connectors::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Connectors::SyncCursor).text().null())
                    .col(
                        ColumnDef::new(Connectors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connectors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connectors_organization_id")
                            .from(Connectors::Table, Connectors::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_connectors_org_kind_domain")
                    .table(Connectors::Table)
                    .col(Connectors::OrganizationId)
                    .col(Connectors::Kind)
                    .col(Connectors::ShopDomain)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_connectors_org_kind_domain").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Connectors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Connectors {
    Table,
    Id,
    OrganizationId,
    Kind,
    ShopDomain,
    CredentialsCiphertext,
    Currency,
    Status,
    LastSyncAt,
    SyncCursor,
    CreatedAt,
    UpdatedAt,
}
