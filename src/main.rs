//! # Product Feeds Main Entry Point
//!
//! Loads configuration, installs tracing, opens and migrates the database and serves the API.

use std::process::ExitCode;

use product_feeds::{config::ConfigLoader, db, server::run_server, telemetry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration from layered env files and variables
    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = telemetry::init_tracing(&config) {
        eprintln!("Failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(configuration = %redacted_json, "Effective configuration");
    }

    let db = match db::connect_and_migrate(&config).await {
        Ok(db) => db,
        Err(err) => {
            error!(error = ?err, "Database unavailable at startup");
            return ExitCode::FAILURE;
        }
    };

    match run_server(config, db).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "Server stopped with an error");
            ExitCode::FAILURE
        }
    }
}
