//! Database migrations for the product feed service.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_organizations;
mod m2025_01_10_000100_create_connectors;
mod m2025_01_10_000200_create_products;
mod m2025_01_10_000300_create_inventory_levels;
mod m2025_01_10_000400_create_feeds;
mod m2025_01_10_000500_create_webhooks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_organizations::Migration),
            Box::new(m2025_01_10_000100_create_connectors::Migration),
            Box::new(m2025_01_10_000200_create_products::Migration),
            Box::new(m2025_01_10_000300_create_inventory_levels::Migration),
            Box::new(m2025_01_10_000400_create_feeds::Migration),
            Box::new(m2025_01_10_000500_create_webhooks::Migration),
        ]
    }
}
