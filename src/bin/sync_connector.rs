use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use product_feeds::{config::ConfigLoader, db, server::AppState, telemetry};
use uuid::Uuid;

/// Runs one pull sync for a connector in the foreground.
#[derive(Debug, Parser)]
#[command(name = "sync-connector", version)]
struct Args {
    /// Connector to sync
    connector_id: Uuid,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    let db = db::connect_and_migrate(&config)
        .await
        .context("initializing database connection pool")?;
    let state = AppState::build(Arc::new(config), db)
        .await
        .context("building application state")?;

    let report = state
        .ingest
        .pull_sync(args.connector_id)
        .await
        .with_context(|| format!("syncing connector {}", args.connector_id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Synced connector {}: {} products over {} pages{}",
            report.connector_id,
            report.products_upserted,
            report.pages,
            if report.truncated {
                " (truncated; run again to continue)"
            } else {
                ""
            }
        );
    }
    Ok(())
}
