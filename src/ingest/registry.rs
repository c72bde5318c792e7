//! Ingestor registry
//!
//! Maps each connector kind to the ingestor that speaks its source API.

use std::collections::HashMap;
use std::sync::Arc;

use super::Ingestor;
use super::csv::CsvIngestor;
use super::shopify::ShopifyIngestor;
use super::woocommerce::WooCommerceIngestor;
use crate::config::SyncConfig;
use crate::models::connector::ConnectorKind;

/// Registry of ingestors keyed by connector kind
#[derive(Clone, Default)]
pub struct IngestorRegistry {
    ingestors: HashMap<ConnectorKind, Arc<dyn Ingestor>>,
}

impl IngestorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Shopify, WooCommerce and CSV ingestors sharing one HTTP client.
    pub fn with_defaults(client: reqwest::Client, sync: &SyncConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ShopifyIngestor::new(client.clone(), sync)));
        registry.register(Arc::new(WooCommerceIngestor::new(client.clone(), sync)));
        registry.register(Arc::new(CsvIngestor::new(client, sync)));
        registry
    }

    /// Register an ingestor, replacing any previous one of the same kind
    pub fn register(&mut self, ingestor: Arc<dyn Ingestor>) {
        self.ingestors.insert(ingestor.kind(), ingestor);
    }

    pub fn get(&self, kind: ConnectorKind) -> Option<Arc<dyn Ingestor>> {
        self.ingestors.get(&kind).cloned()
    }

    /// Kinds with a registered ingestor, sorted by name
    pub fn kinds(&self) -> Vec<ConnectorKind> {
        let mut kinds: Vec<ConnectorKind> = self.ingestors.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}
