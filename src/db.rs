//! Product store connection.
//!
//! Postgres in production, SQLite for local runs and tests. The schema is migrated before the
//! service accepts webhooks or starts the scheduler.

use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("product store unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: sea_orm::DbErr,
    },
    #[error("invalid database configuration: {0}")]
    InvalidConfiguration(String),
}

fn connect_options(cfg: &AppConfig) -> Result<ConnectOptions, DatabaseError> {
    if cfg.database_url.trim().is_empty() {
        return Err(DatabaseError::InvalidConfiguration(
            "database url is empty".into(),
        ));
    }
    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    // Every pooled connection to `sqlite::memory:` would open its own empty database.
    if cfg.database_url.contains(":memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(cfg.db_max_connections);
    }
    Ok(opt)
}

/// Opens the connection pool, retrying transient failures with doubling pauses.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    let opt = connect_options(cfg)?;
    let mut pause = Duration::from_millis(100);
    let mut attempt = 1;
    loop {
        match Database::connect(opt.clone()).await {
            Ok(db) => {
                info!(attempt, "Connected to product store");
                return Ok(db);
            }
            Err(source) if attempt >= CONNECT_ATTEMPTS => {
                return Err(DatabaseError::Unreachable {
                    attempts: attempt,
                    source,
                }
                .into());
            }
            Err(e) => {
                warn!(attempt, error = %e, retry_in = ?pause, "Product store connection failed");
                sleep(pause).await;
                pause *= 2;
                attempt += 1;
            }
        }
    }
}

/// Opens the pool and brings the schema up to date.
pub async fn connect_and_migrate(cfg: &AppConfig) -> Result<DatabaseConnection> {
    let db = init_pool(cfg).await?;
    Migrator::up(&db, None)
        .await
        .context("failed to apply database migrations")?;
    Ok(db)
}

/// `SELECT 1` against the pool.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .context("database health check failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::organization;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[tokio::test]
    async fn empty_url_is_rejected_before_connecting() {
        let config = AppConfig {
            database_url: "  ".to_string(),
            ..AppConfig::default()
        };
        let err = init_pool(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_store_is_migrated_and_shared() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 8,
            ..AppConfig::default()
        };
        let db = connect_and_migrate(&config).await.unwrap();
        health_check(&db).await.unwrap();
        // A second connection would see no tables at all.
        assert_eq!(organization::Entity::find().count(&db).await.unwrap(), 0);
        assert!(!Migrator::get_applied_migrations(&db).await.unwrap().is_empty());
    }
}
