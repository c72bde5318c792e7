//! # Product Feeds Library
//!
//! Ingests products from commerce platforms into a normalized store and renders them into
//! marketing channel feeds, regenerated on demand or on a schedule.

pub mod config;
pub mod crypto;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod feeds;
pub mod filter;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod notifications;
pub mod render;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod webhook_verification;
pub use migration;
