//! Ingest service: applies parsed source events to the product store and runs pull syncs.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::inventory::merge_variants;
use super::registry::IngestorRegistry;
use super::trait_::{IngestEvent, Ingestor, ProductPage};
use super::{CanonicalProduct, IngestError, SourceContext};
use crate::config::SyncConfig;
use crate::crypto::{CryptoKey, open_credentials};
use crate::ingest::canonical::is_managed;
use crate::models::connector::{self, ConnectorKind, ConnectorStatus};
use crate::models::product;
use crate::error::PipelineError;
use crate::repositories::connector::NewConnector;
use crate::repositories::{ConnectorRepository, InventoryRepository, ProductRepository};

/// Summary of one pull sync.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SyncReport {
    pub connector_id: Uuid,
    pub pages: u32,
    pub products_upserted: u64,
    /// The page cap was reached before the listing ended
    pub truncated: bool,
    /// Where the next sync resumes when truncated
    pub next_cursor: Option<String>,
}

/// Effect of one applied webhook event.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Upserted(product::Model),
    Deleted { found: bool },
    InventoryApplied { variants_updated: usize },
    ConnectorDeactivated { products: u64 },
    Ignored,
}

pub struct IngestService {
    db: DatabaseConnection,
    registry: IngestorRegistry,
    crypto_key: Option<CryptoKey>,
    sync: SyncConfig,
    organization_id: Uuid,
}

impl IngestService {
    pub fn new(
        db: DatabaseConnection,
        registry: IngestorRegistry,
        crypto_key: Option<CryptoKey>,
        sync: SyncConfig,
        organization_id: Uuid,
    ) -> Self {
        Self {
            db,
            registry,
            crypto_key,
            sync,
            organization_id,
        }
    }

    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn connectors(&self) -> ConnectorRepository {
        ConnectorRepository::new(self.db.clone())
    }

    fn products(&self) -> ProductRepository {
        ProductRepository::new(self.db.clone())
    }

    /// Registers a connector. One with credentials stays `pending` until its first pull sync.
    /// Registering an uninstalled shop again reactivates its existing row.
    pub async fn register_connector(
        &self,
        kind: ConnectorKind,
        shop_domain: &str,
        credentials: serde_json::Value,
        currency: Option<String>,
    ) -> Result<connector::Model, IngestError> {
        if self.registry.get(kind).is_none() {
            return Err(IngestError::BadPayload(format!("no ingestor for {kind}")));
        }
        let status = if credentials.is_null() {
            ConnectorStatus::Active
        } else {
            ConnectorStatus::Pending
        };
        let new = NewConnector {
            kind,
            shop_domain: shop_domain.to_string(),
            credentials,
            currency,
            status,
        };
        let repo = self.connectors();
        let registered = match repo
            .find_by_domain(self.organization_id, kind, shop_domain)
            .await?
        {
            Some(existing) if existing.status == ConnectorStatus::Inactive.as_str() => {
                repo.reinstall(existing, new, self.crypto_key.as_ref()).await
            }
            _ => {
                repo.create(self.organization_id, new, self.crypto_key.as_ref())
                    .await
            }
        };
        registered.map_err(|err| match err {
            PipelineError::Storage(db) => IngestError::Storage(db),
            other => IngestError::BadPayload(other.to_string()),
        })
    }

    pub async fn list_connectors(&self) -> Result<Vec<connector::Model>, IngestError> {
        Ok(self.connectors().list(self.organization_id).await?)
    }

    /// Finds the connector a webhook belongs to.
    pub async fn connector_for_domain(
        &self,
        kind: ConnectorKind,
        shop_domain: &str,
    ) -> Result<connector::Model, IngestError> {
        self.connectors()
            .find_by_domain(self.organization_id, kind, shop_domain)
            .await?
            .ok_or_else(|| IngestError::NotFoundConnector(shop_domain.to_string()))
    }

    pub async fn connector_by_id(&self, id: Uuid) -> Result<connector::Model, IngestError> {
        self.connectors()
            .find(self.organization_id, id)
            .await?
            .ok_or_else(|| IngestError::NotFoundConnector(id.to_string()))
    }

    fn ingestor_for(&self, connector: &connector::Model) -> Result<Arc<dyn Ingestor>, IngestError> {
        let kind: ConnectorKind = connector
            .kind
            .parse()
            .map_err(IngestError::BadPayload)?;
        self.registry
            .get(kind)
            .ok_or_else(|| IngestError::NotFoundConnector(format!("{kind} ingestor")))
    }

    fn source_context(&self, connector: &connector::Model) -> Result<SourceContext, IngestError> {
        let credentials = open_credentials(self.crypto_key.as_ref(), connector).map_err(|e| {
            warn!(connector_id = %connector.id, "Connector credentials could not be opened");
            IngestError::BadPayload(format!("connector credentials unreadable: {e}"))
        })?;
        Ok(SourceContext {
            base_url: SourceContext::base_url_for(&connector.shop_domain),
            credentials,
            currency: connector.currency.clone(),
            page_size: self.sync.page_size,
        })
    }

    /// Parses a verified webhook body and applies it.
    #[instrument(skip_all, fields(connector_id = %connector.id, topic = %topic))]
    pub async fn handle_webhook(
        &self,
        connector: &connector::Model,
        topic: &str,
        body: &[u8],
    ) -> Result<ApplyOutcome, IngestError> {
        // Deliveries queued before an uninstall must not revive its products.
        if connector.status == ConnectorStatus::Inactive.as_str() {
            debug!("Connector is uninstalled; webhook ignored");
            counter!("webhooks_ignored_total", "reason" => "inactive_connector").increment(1);
            return Ok(ApplyOutcome::Ignored);
        }
        let ingestor = self.ingestor_for(connector)?;
        let ctx = self.webhook_context(connector);
        let event = ingestor.parse_webhook(&ctx, topic, body)?;
        self.apply_event(connector, event).await
    }

    /// Webhook parsing never calls the source, so credentials stay sealed.
    fn webhook_context(&self, connector: &connector::Model) -> SourceContext {
        SourceContext {
            base_url: SourceContext::base_url_for(&connector.shop_domain),
            credentials: serde_json::Value::Null,
            currency: connector.currency.clone(),
            page_size: self.sync.page_size,
        }
    }

    pub async fn apply_event(
        &self,
        connector: &connector::Model,
        event: IngestEvent,
    ) -> Result<ApplyOutcome, IngestError> {
        match event {
            IngestEvent::ProductUpsert(product) => {
                let stored = self.upsert_product(connector, product).await?;
                Ok(ApplyOutcome::Upserted(stored))
            }
            IngestEvent::ProductDelete { external_id } => {
                let found = self.products().mark_inactive(connector.id, &external_id).await?;
                if !found {
                    warn!(
                        connector_id = %connector.id,
                        external_id = %external_id,
                        "Delete for unknown product ignored"
                    );
                }
                Ok(ApplyOutcome::Deleted { found })
            }
            IngestEvent::InventoryUpdate {
                inventory_item_id,
                location_id,
                available,
            } => {
                let variants_updated = self
                    .apply_inventory(connector, &inventory_item_id, &location_id, available)
                    .await?;
                Ok(ApplyOutcome::InventoryApplied { variants_updated })
            }
            IngestEvent::AppUninstalled => {
                let products = self.uninstall(connector).await?;
                Ok(ApplyOutcome::ConnectorDeactivated { products })
            }
            IngestEvent::Ignored { topic } => {
                debug!(topic = %topic, "Ignoring webhook topic");
                Ok(ApplyOutcome::Ignored)
            }
        }
    }

    /// Upserts one product, merging variants with the stored copy first.
    pub async fn upsert_product(
        &self,
        connector: &connector::Model,
        mut product: CanonicalProduct,
    ) -> Result<product::Model, IngestError> {
        let repo = self.products();
        if let Some(existing) = repo
            .find_by_external(connector.id, &product.external_id)
            .await?
        {
            product.variants = merge_variants(&existing.variant_list(), product.variants);
        }

        let stored = repo
            .upsert(self.organization_id, connector.id, &product)
            .await?;
        counter!("products_ingested_total", "kind" => connector.kind.clone()).increment(1);
        debug!(
            product_id = %stored.id,
            external_id = %stored.external_id,
            status = %stored.status,
            "Product upserted"
        );
        Ok(stored)
    }

    /// Stores a location level and rolls the item's total into matching tracked variants.
    async fn apply_inventory(
        &self,
        connector: &connector::Model,
        inventory_item_id: &str,
        location_id: &str,
        available: Option<i64>,
    ) -> Result<usize, IngestError> {
        let inventory = InventoryRepository::new(self.db.clone());
        match available {
            Some(quantity) => {
                inventory
                    .upsert_level(
                        self.organization_id,
                        connector.id,
                        inventory_item_id,
                        location_id,
                        quantity,
                    )
                    .await?
            }
            None => {
                inventory
                    .delete_level(connector.id, inventory_item_id, location_id)
                    .await?
            }
        }
        let total = inventory
            .total_for_item(connector.id, inventory_item_id)
            .await?;

        let repo = self.products();
        let mut updated = 0;
        for stored in repo
            .find_by_inventory_item(connector.id, inventory_item_id)
            .await?
        {
            let mut variants = stored.variant_list();
            let mut touched = false;
            for variant in variants.iter_mut() {
                if variant.inventory_item_id.as_deref() == Some(inventory_item_id)
                    && is_managed(variant)
                {
                    variant.inventory_quantity = Some(total);
                    touched = true;
                    updated += 1;
                }
            }
            if touched {
                repo.replace_variants(stored, variants).await?;
            }
        }
        debug!(inventory_item_id, location_id, total, updated, "Inventory level applied");
        Ok(updated)
    }

    /// Marks the connector and every product it supplied inactive.
    pub async fn uninstall(&self, connector: &connector::Model) -> Result<u64, IngestError> {
        self.connectors()
            .set_status(connector.clone(), ConnectorStatus::Inactive)
            .await?;
        let products = self.products().deactivate_connector(connector.id).await?;
        info!(
            connector_id = %connector.id,
            products,
            "Connector uninstalled; products deactivated"
        );
        Ok(products)
    }

    /// Pulls the connector's listing, at most `max_pages` pages, resuming a truncated sync.
    #[instrument(skip(self), fields(organization_id = %self.organization_id))]
    pub async fn pull_sync(&self, connector_id: Uuid) -> Result<SyncReport, IngestError> {
        let mut connector = self.connector_by_id(connector_id).await?;
        if connector.status == ConnectorStatus::Inactive.as_str() {
            return Err(IngestError::BadPayload(format!(
                "connector {connector_id} is inactive"
            )));
        }
        let ingestor = self.ingestor_for(&connector)?;
        let mut ctx = self.source_context(&connector)?;

        if ctx.currency.is_none() {
            match self
                .with_retries(|| ingestor.fetch_currency(&ctx))
                .await
            {
                Ok(Some(currency)) => {
                    connector = self
                        .connectors()
                        .set_currency(connector, currency.clone())
                        .await?;
                    ctx.currency = Some(currency);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Shop currency unavailable; products fall back to USD"),
            }
        }

        let mut report = SyncReport {
            connector_id,
            ..SyncReport::default()
        };
        let mut cursor = connector.sync_cursor.clone();
        if cursor.is_some() {
            info!(connector_id = %connector_id, "Resuming truncated listing");
        }

        loop {
            if report.pages >= self.sync.max_pages {
                report.truncated = true;
                warn!(
                    connector_id = %connector_id,
                    max_pages = self.sync.max_pages,
                    "Page cap reached; remaining products sync on the next run"
                );
                break;
            }

            let page: ProductPage = self
                .with_retries(|| ingestor.fetch_page(&ctx, cursor.clone()))
                .await?;
            report.pages += 1;

            let item_ids: Vec<String> = page
                .products
                .iter()
                .flat_map(|p| p.variants.iter())
                .filter_map(|v| v.inventory_item_id.clone())
                .collect();

            for product in page.products {
                self.upsert_product(&connector, product).await?;
                report.products_upserted += 1;
            }
            self.refresh_inventory(&connector, ingestor.as_ref(), &ctx, &item_ids)
                .await;

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        report.next_cursor = if report.truncated { cursor } else { None };
        self.connectors()
            .record_sync(connector_id, report.next_cursor.clone())
            .await?;
        if connector.status == ConnectorStatus::Pending.as_str() {
            self.connectors()
                .set_status(connector, ConnectorStatus::Active)
                .await?;
        }

        counter!("connector_syncs_total", "outcome" => "completed").increment(1);
        info!(
            connector_id = %connector_id,
            pages = report.pages,
            products = report.products_upserted,
            truncated = report.truncated,
            "Pull sync finished"
        );
        Ok(report)
    }

    /// Location levels are best-effort; a failure leaves the listing quantities in place.
    async fn refresh_inventory(
        &self,
        connector: &connector::Model,
        ingestor: &dyn Ingestor,
        ctx: &SourceContext,
        item_ids: &[String],
    ) {
        if item_ids.is_empty() {
            return;
        }
        let readings = match ingestor.fetch_inventory(ctx, item_ids).await {
            Ok(readings) => readings,
            Err(e) => {
                warn!(connector_id = %connector.id, error = %e, "Inventory levels unavailable");
                return;
            }
        };
        let inventory = InventoryRepository::new(self.db.clone());
        for reading in readings {
            let Some(available) = reading.available else {
                continue;
            };
            if let Err(e) = inventory
                .upsert_level(
                    self.organization_id,
                    connector.id,
                    &reading.inventory_item_id,
                    &reading.location_id,
                    available,
                )
                .await
            {
                warn!(error = %e, "Failed to store inventory level");
            }
        }
    }

    /// Retries transport failures with a random pause inside the configured window.
    async fn with_retries<T, F, Fut>(&self, operation: F) -> Result<T, IngestError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, IngestError>>,
    {
        let max_attempts = self.sync.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = Duration::from_secs(
                        rand::thread_rng()
                            .gen_range(self.sync.retry_min_seconds..=self.sync.retry_max_seconds),
                    );
                    warn!(attempt, error = %e, ?delay, "Source request failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        counter!("connector_syncs_total", "outcome" => "upstream_unavailable")
                            .increment(1);
                    }
                    return Err(e);
                }
            }
        }
    }
}
