//! The capability every product source implements.

use async_trait::async_trait;

use super::canonical::CanonicalProduct;
use super::{IngestError, SourceContext};
use crate::models::connector::ConnectorKind;

/// One page of a product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductPage {
    pub products: Vec<CanonicalProduct>,
    /// Opaque cursor for the following page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// Per-location stock reported by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryReading {
    pub inventory_item_id: String,
    pub location_id: String,
    pub available: Option<i64>,
}

/// A single change parsed from an inbound webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    ProductUpsert(CanonicalProduct),
    ProductDelete {
        external_id: String,
    },
    InventoryUpdate {
        inventory_item_id: String,
        location_id: String,
        /// `None` for a level deletion
        available: Option<i64>,
    },
    AppUninstalled,
    /// Topic the source sends but the pipeline has no use for
    Ignored {
        topic: String,
    },
}

#[async_trait]
pub trait Ingestor: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    /// Fetches the listing page addressed by `cursor` (the first page when `None`).
    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        cursor: Option<String>,
    ) -> Result<ProductPage, IngestError>;

    /// Shop currency, for sources that expose it separately from products.
    async fn fetch_currency(&self, _ctx: &SourceContext) -> Result<Option<String>, IngestError> {
        Ok(None)
    }

    /// Per-location stock for the given inventory items, for sources that track locations.
    async fn fetch_inventory(
        &self,
        _ctx: &SourceContext,
        _inventory_item_ids: &[String],
    ) -> Result<Vec<InventoryReading>, IngestError> {
        Ok(Vec::new())
    }

    /// Parses a verified webhook body for `topic` (e.g. `products/update`).
    fn parse_webhook(
        &self,
        ctx: &SourceContext,
        topic: &str,
        body: &[u8],
    ) -> Result<IngestEvent, IngestError>;
}
