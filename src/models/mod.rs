//! # Data Models
//!
//! SeaORM entities for the product store, feeds and their audit trail.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connector;
pub mod feed;
pub mod feed_schedule;
pub mod generation_run;
pub mod inventory_level;
pub mod notification;
pub mod organization;
pub mod product;
pub mod webhook;
pub mod webhook_delivery;

pub use connector::Entity as Connector;
pub use feed::Entity as Feed;
pub use feed_schedule::Entity as FeedSchedule;
pub use generation_run::Entity as GenerationRun;
pub use inventory_level::Entity as InventoryLevel;
pub use notification::Entity as Notification;
pub use organization::Entity as Organization;
pub use product::Entity as Product;
pub use webhook::Entity as Webhook;
pub use webhook_delivery::Entity as WebhookDelivery;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "product-feeds".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
