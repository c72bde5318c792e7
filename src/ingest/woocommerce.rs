//! WooCommerce REST API (v3) ingestor.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use url::Url;

use super::canonical::{
    self, CanonicalProduct, DEFAULT_CURRENCY, decimal_from, metadata_document, non_empty_str,
    string_id,
};
use super::trait_::{IngestEvent, Ingestor, ProductPage};
use super::{IngestError, SourceContext};
use crate::config::SyncConfig;
use crate::models::connector::ConnectorKind;
use crate::models::product::Variant;

/// Largest `per_page` the WooCommerce API accepts.
pub const MAX_PER_PAGE: u32 = 100;
const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";

pub struct WooCommerceIngestor {
    client: reqwest::Client,
    listing_timeout: Duration,
}

impl WooCommerceIngestor {
    pub fn new(client: reqwest::Client, sync: &SyncConfig) -> Self {
        Self {
            client,
            listing_timeout: Duration::from_secs(sync.listing_timeout_seconds),
        }
    }
}

#[async_trait]
impl Ingestor for WooCommerceIngestor {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Woocommerce
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        cursor: Option<String>,
    ) -> Result<ProductPage, IngestError> {
        let page: u32 = match cursor.as_deref() {
            Some(raw) => raw
                .parse()
                .map_err(|_| IngestError::BadPayload(format!("invalid page cursor '{raw}'")))?,
            None => 1,
        };
        let per_page = ctx.page_size.clamp(1, MAX_PER_PAGE);

        let mut url = Url::parse(&format!("{}/wp-json/wc/v3/products", ctx.base_url))
            .map_err(|e| IngestError::BadPayload(format!("invalid store url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());

        let mut request = self.client.get(url).timeout(self.listing_timeout);
        if let Some(key) = ctx.credential("consumer_key") {
            request = request.basic_auth(key, ctx.credential("consumer_secret"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok());

        let items: Vec<JsonValue> = response.json().await?;
        let full_page = items.len() as u32 >= per_page;

        let mut products = Vec::with_capacity(items.len());
        for item in &items {
            match parse_product(item, ctx.currency.as_deref()) {
                Ok(product) => products.push(product),
                Err(e) => warn!(error = %e, "Skipping malformed WooCommerce product"),
            }
        }

        let has_next = match total_pages {
            Some(total) => page < total,
            None => full_page,
        };
        debug!(page, count = products.len(), has_next, "Fetched WooCommerce product page");

        Ok(ProductPage {
            products,
            next_cursor: has_next.then(|| (page + 1).to_string()),
        })
    }

    fn parse_webhook(
        &self,
        ctx: &SourceContext,
        topic: &str,
        body: &[u8],
    ) -> Result<IngestEvent, IngestError> {
        match topic {
            "product.created" | "product.updated" | "product.restored" => {
                let payload: JsonValue = serde_json::from_slice(body)?;
                parse_product(&payload, ctx.currency.as_deref()).map(IngestEvent::ProductUpsert)
            }
            "product.deleted" => {
                let payload: JsonValue = serde_json::from_slice(body)?;
                let external_id = string_id(payload.get("id"))
                    .ok_or_else(|| IngestError::BadPayload("delete payload has no id".into()))?;
                Ok(IngestEvent::ProductDelete { external_id })
            }
            other => Ok(IngestEvent::Ignored {
                topic: other.to_string(),
            }),
        }
    }
}

/// Normalizes one WooCommerce product object into a product with a single variant.
pub fn parse_product(
    product: &JsonValue,
    fallback_currency: Option<&str>,
) -> Result<CanonicalProduct, IngestError> {
    let external_id = string_id(product.get("id"))
        .ok_or_else(|| IngestError::BadPayload("product has no id".into()))?;
    let title = non_empty_str(product.get("name"))
        .ok_or_else(|| IngestError::BadPayload(format!("product {external_id} has no name")))?;

    let variant = Variant {
        variant_id: external_id.clone(),
        title: None,
        price: decimal_from(product.get("price")).or_else(|| decimal_from(product.get("regular_price"))),
        sku: non_empty_str(product.get("sku")),
        inventory_quantity: product.get("stock_quantity").and_then(JsonValue::as_i64),
        inventory_management: product.get("manage_stock").and_then(JsonValue::as_bool).map(
            |managed| {
                if managed {
                    "woocommerce".to_string()
                } else {
                    "not_managed".to_string()
                }
            },
        ),
        inventory_policy: product
            .get("backorders")
            .and_then(JsonValue::as_str)
            .map(|backorders| if backorders == "no" { "deny" } else { "continue" }.to_string()),
        inventory_item_id: None,
        barcode: non_empty_str(product.get("global_unique_id")),
    };

    let names = |key: &str| -> Vec<String> {
        product
            .get(key)
            .and_then(JsonValue::as_array)
            .map(|items| items.iter().filter_map(|item| non_empty_str(item.get("name"))).collect())
            .unwrap_or_default()
    };
    let categories = names("categories");
    let brand = names("brands").into_iter().next().or_else(|| brand_attribute(product));

    let images = product
        .get("images")
        .and_then(JsonValue::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| non_empty_str(image.get("src")))
                .collect()
        })
        .unwrap_or_default();

    let mut canonical = CanonicalProduct {
        external_id,
        title,
        description: non_empty_str(product.get("description"))
            .or_else(|| non_empty_str(product.get("short_description"))),
        price: Default::default(),
        currency: fallback_currency.unwrap_or(DEFAULT_CURRENCY).to_string(),
        sku: None,
        brand,
        category: categories.first().cloned(),
        images,
        variants: vec![variant],
        metadata: metadata_document(
            non_empty_str(product.get("slug")),
            names("tags"),
            categories,
            product.get("variations").cloned().unwrap_or(JsonValue::Array(Vec::new())),
        ),
        upstream_status: canonical::upstream_status(product.get("status").and_then(JsonValue::as_str)),
    };
    canonical.promote_first_variant();
    Ok(canonical)
}

fn brand_attribute(product: &JsonValue) -> Option<String> {
    product
        .get("attributes")?
        .as_array()?
        .iter()
        .find(|attribute| {
            attribute
                .get("name")
                .and_then(JsonValue::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case("brand"))
        })
        .and_then(|attribute| attribute.get("options")?.as_array()?.first().cloned())
        .and_then(|option| option.as_str().map(str::to_string))
}
