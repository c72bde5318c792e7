//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the product store,
//! feeds and their audit trail. Every read is scoped by organization.

pub mod connector;
pub mod feed;
pub mod generation_run;
pub mod inventory;
pub mod notification;
pub mod organization;
pub mod product;
pub mod schedule;
pub mod webhook;
pub mod webhook_delivery;

pub use connector::ConnectorRepository;
pub use feed::FeedRepository;
pub use generation_run::GenerationRunRepository;
pub use inventory::InventoryRepository;
pub use notification::NotificationRepository;
pub use organization::OrganizationRepository;
pub use product::ProductRepository;
pub use schedule::ScheduleRepository;
pub use webhook::WebhookRepository;
pub use webhook_delivery::WebhookDeliveryRepository;
