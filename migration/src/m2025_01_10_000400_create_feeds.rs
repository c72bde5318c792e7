//! Creates feeds, their schedules and the generation run audit log.

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
                    .table(Feeds::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Feeds::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Feeds::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Feeds::ConnectorId).uuid().null())
                    .col(ColumnDef::new(Feeds::Name).text().not_null())
                    .col(ColumnDef::new(Feeds::Channel).text().not_null())
                    .col(ColumnDef::new(Feeds::Format).text().not_null())
                    .col(ColumnDef::new(Feeds::Settings).json_binary().not_null())
                    .col(
                        ColumnDef::new(Feeds::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Feeds::ProductsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Feeds::LastGenerated)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Feeds::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Feeds::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_feeds_organization_id")
                            .from(Feeds::Table, Feeds::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FeedSchedules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FeedSchedules::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FeedSchedules::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(FeedSchedules::FeedId).uuid().not_null())
                    .col(
                        ColumnDef::new(FeedSchedules::Enabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::IntervalHours)
                            .integer()
                            .not_null()
                            .default(24),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::NextRunAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::LastRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FeedSchedules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_feed_schedules_feed_id")
                            .from(FeedSchedules::Table, FeedSchedules::FeedId)
                            .to(Feeds::Table, Feeds::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_feed_schedules_feed_id")
                    .table(FeedSchedules::Table)
                    .col(FeedSchedules::FeedId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feed_schedules_due")
                    .table(FeedSchedules::Table)
                    .col(FeedSchedules::Enabled)
                    .col(FeedSchedules::Status)
                    .col(FeedSchedules::NextRunAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GenerationRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GenerationRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GenerationRuns::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(GenerationRuns::FeedId).uuid().not_null())
                    .col(
                        ColumnDef::new(GenerationRuns::Status)
                            .text()
                            .not_null()
                            .default("started"),
                    )
                    .col(
                        ColumnDef::new(GenerationRuns::ProductsProcessed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GenerationRuns::ProductsIncluded)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GenerationRuns::ProductsExcluded)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(GenerationRuns::GenerationTimeMs).big_integer().null())
                    .col(ColumnDef::new(GenerationRuns::FileSizeBytes).big_integer().null())
                    .col(ColumnDef::new(GenerationRuns::FileUrl).text().null())
                    .col(ColumnDef::new(GenerationRuns::FileFormat).text().not_null())
                    .col(ColumnDef::new(GenerationRuns::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(GenerationRuns::ValidationIssues)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GenerationRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GenerationRuns::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generation_runs_feed_id")
                            .from(GenerationRuns::Table, GenerationRuns::FeedId)
                            .to(Feeds::Table, Feeds::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_generation_runs_feed_started")
                    .table(GenerationRuns::Table)
                    .col(GenerationRuns::FeedId)
                    .col(GenerationRuns::StartedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GenerationRuns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FeedSchedules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Feeds::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Feeds {
    Table,
    Id,
    OrganizationId,
    ConnectorId,
    Name,
    Channel,
    Format,
    Settings,
    Status,
    ProductsCount,
    LastGenerated,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FeedSchedules {
    Table,
    Id,
    OrganizationId,
    FeedId,
    Enabled,
    IntervalHours,
    NextRunAt,
    LastRunAt,
    Status,
    ConsecutiveFailures,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GenerationRuns {
    Table,
    Id,
    OrganizationId,
    FeedId,
    Status,
    ProductsProcessed,
    ProductsIncluded,
    ProductsExcluded,
    GenerationTimeMs,
    FileSizeBytes,
    FileUrl,
    FileFormat,
    ErrorMessage,
    ValidationIssues,
    StartedAt,
    CompletedAt,
}
