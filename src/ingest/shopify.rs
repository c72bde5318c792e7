//! Shopify Admin API ingestor.
//!
//! Listings use cursor paging through the `Link: <...page_info=...>; rel="next"` header.
//! Webhook bodies are the bare resource object of the topic.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use url::Url;

use super::canonical::{
    self, CanonicalProduct, DEFAULT_CURRENCY, decimal_from, metadata_document, non_empty_str,
    split_tags, string_id,
};
use super::trait_::{IngestEvent, Ingestor, InventoryReading, ProductPage};
use super::{IngestError, SourceContext};
use crate::config::SyncConfig;
use crate::models::connector::ConnectorKind;
use crate::models::product::Variant;

pub const API_VERSION: &str = "2024-01";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

pub struct ShopifyIngestor {
    client: reqwest::Client,
    listing_timeout: Duration,
    shop_timeout: Duration,
    inventory_timeout: Duration,
}

impl ShopifyIngestor {
    pub fn new(client: reqwest::Client, sync: &SyncConfig) -> Self {
        Self {
            client,
            listing_timeout: Duration::from_secs(sync.listing_timeout_seconds),
            shop_timeout: Duration::from_secs(sync.shop_timeout_seconds),
            inventory_timeout: Duration::from_secs(sync.inventory_timeout_seconds),
        }
    }

    fn admin_url(&self, ctx: &SourceContext, resource: &str) -> Result<Url, IngestError> {
        Url::parse(&format!(
            "{}/admin/api/{API_VERSION}/{resource}",
            ctx.base_url
        ))
        .map_err(|e| IngestError::BadPayload(format!("invalid shop url: {e}")))
    }

    async fn get_json(
        &self,
        ctx: &SourceContext,
        url: Url,
        timeout: Duration,
    ) -> Result<(JsonValue, Option<String>), IngestError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(token) = ctx.credential("access_token") {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        let link_header = response
            .headers()
            .get("Link")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: JsonValue = response.json().await?;
        Ok((body, link_header))
    }
}

#[async_trait]
impl Ingestor for ShopifyIngestor {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Shopify
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        cursor: Option<String>,
    ) -> Result<ProductPage, IngestError> {
        let mut url = self.admin_url(ctx, "products.json")?;
        url.query_pairs_mut()
            .append_pair("limit", &ctx.page_size.min(250).to_string());
        if let Some(page_info) = cursor.as_deref() {
            url.query_pairs_mut().append_pair("page_info", page_info);
        }

        let (body, link_header) = self.get_json(ctx, url, self.listing_timeout).await?;
        let items = body
            .get("products")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| IngestError::BadPayload("listing has no products array".into()))?;

        let mut products = Vec::with_capacity(items.len());
        for item in items {
            match parse_product(item, ctx.currency.as_deref()) {
                Ok(product) => products.push(product),
                Err(e) => warn!(error = %e, "Skipping malformed Shopify product"),
            }
        }

        let next_cursor = link_header.as_deref().and_then(parse_link_header);
        debug!(
            count = products.len(),
            has_next = next_cursor.is_some(),
            "Fetched Shopify product page"
        );

        Ok(ProductPage {
            products,
            next_cursor,
        })
    }

    /// Reads `shop.currency` from the shop resource.
    async fn fetch_currency(&self, ctx: &SourceContext) -> Result<Option<String>, IngestError> {
        let url = self.admin_url(ctx, "shop.json")?;
        let (body, _) = self.get_json(ctx, url, self.shop_timeout).await?;
        Ok(non_empty_str(body.get("shop").and_then(|shop| shop.get("currency"))))
    }

    /// Fetches per-location stock for the given inventory items.
    async fn fetch_inventory(
        &self,
        ctx: &SourceContext,
        inventory_item_ids: &[String],
    ) -> Result<Vec<InventoryReading>, IngestError> {
        if inventory_item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = self.admin_url(ctx, "inventory_levels.json")?;
        url.query_pairs_mut()
            .append_pair("inventory_item_ids", &inventory_item_ids.join(","))
            .append_pair("limit", "250");

        let (body, _) = self.get_json(ctx, url, self.inventory_timeout).await?;
        let levels = body
            .get("inventory_levels")
            .and_then(JsonValue::as_array)
            .map(|levels| levels.iter().filter_map(parse_inventory_level).collect())
            .unwrap_or_default();
        Ok(levels)
    }

    fn parse_webhook(
        &self,
        ctx: &SourceContext,
        topic: &str,
        body: &[u8],
    ) -> Result<IngestEvent, IngestError> {
        let payload: JsonValue = serde_json::from_slice(body)?;

        match topic {
            "products/create" | "products/update" => {
                let product = payload.get("product").unwrap_or(&payload);
                parse_product(product, ctx.currency.as_deref()).map(IngestEvent::ProductUpsert)
            }
            "products/delete" => {
                let external_id = string_id(payload.get("id"))
                    .ok_or_else(|| IngestError::BadPayload("delete payload has no id".into()))?;
                Ok(IngestEvent::ProductDelete { external_id })
            }
            "inventory_levels/update" | "inventory_levels/connect" => {
                let reading = parse_inventory_level(&payload).ok_or_else(|| {
                    IngestError::BadPayload("inventory payload missing item or location".into())
                })?;
                Ok(IngestEvent::InventoryUpdate {
                    inventory_item_id: reading.inventory_item_id,
                    location_id: reading.location_id,
                    available: reading.available,
                })
            }
            "inventory_levels/delete" | "inventory_levels/disconnect" => {
                let reading = parse_inventory_level(&payload).ok_or_else(|| {
                    IngestError::BadPayload("inventory payload missing item or location".into())
                })?;
                Ok(IngestEvent::InventoryUpdate {
                    inventory_item_id: reading.inventory_item_id,
                    location_id: reading.location_id,
                    available: None,
                })
            }
            "app/uninstalled" => Ok(IngestEvent::AppUninstalled),
            other => Ok(IngestEvent::Ignored {
                topic: other.to_string(),
            }),
        }
    }
}

/// Normalizes one Shopify product object.
pub fn parse_product(
    product: &JsonValue,
    fallback_currency: Option<&str>,
) -> Result<CanonicalProduct, IngestError> {
    let external_id = string_id(product.get("id"))
        .ok_or_else(|| IngestError::BadPayload("product has no id".into()))?;
    let title = non_empty_str(product.get("title"))
        .ok_or_else(|| IngestError::BadPayload(format!("product {external_id} has no title")))?;

    let raw_variants = product
        .get("variants")
        .cloned()
        .unwrap_or(JsonValue::Array(Vec::new()));
    let variants: Vec<Variant> = raw_variants
        .as_array()
        .map(|items| items.iter().filter_map(parse_variant).collect())
        .unwrap_or_default();

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

    let tags = match product.get("tags") {
        Some(JsonValue::String(raw)) => split_tags(raw),
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|tag| tag.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    let collections = product
        .get("collections")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string).or_else(|| non_empty_str(item.get("title"))))
                .collect()
        })
        .unwrap_or_default();

    let currency = non_empty_str(product.get("currency"))
        .or_else(|| fallback_currency.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let mut canonical = CanonicalProduct {
        external_id,
        title,
        description: non_empty_str(product.get("body_html")),
        price: Default::default(),
        currency,
        sku: None,
        brand: non_empty_str(product.get("vendor")),
        category: non_empty_str(product.get("product_type")),
        images,
        variants,
        metadata: metadata_document(
            non_empty_str(product.get("handle")),
            tags,
            collections,
            raw_variants,
        ),
        upstream_status: canonical::upstream_status(product.get("status").and_then(JsonValue::as_str)),
    };
    canonical.promote_first_variant();
    Ok(canonical)
}

fn parse_variant(variant: &JsonValue) -> Option<Variant> {
    Some(Variant {
        variant_id: string_id(variant.get("id"))?,
        title: non_empty_str(variant.get("title")),
        price: decimal_from(variant.get("price")),
        sku: non_empty_str(variant.get("sku")),
        inventory_quantity: variant.get("inventory_quantity").and_then(JsonValue::as_i64),
        // Kept verbatim, empty string included; the merge policy decides what empty means.
        inventory_management: match variant.get("inventory_management") {
            Some(JsonValue::String(raw)) => Some(raw.clone()),
            _ => None,
        },
        inventory_policy: non_empty_str(variant.get("inventory_policy")),
        inventory_item_id: string_id(variant.get("inventory_item_id")),
        barcode: non_empty_str(variant.get("barcode")),
    })
}

fn parse_inventory_level(level: &JsonValue) -> Option<InventoryReading> {
    Some(InventoryReading {
        inventory_item_id: string_id(level.get("inventory_item_id"))?,
        location_id: string_id(level.get("location_id"))?,
        available: level.get("available").and_then(JsonValue::as_i64),
    })
}

/// Extracts the `page_info` of the `rel="next"` link.
///
/// Format: `<https://shop/admin/api/2024-01/products.json?limit=250&page_info=abc>; rel="next", ...`
pub fn parse_link_header(link_header: &str) -> Option<String> {
    for link in link_header.split(',') {
        let parts: Vec<&str> = link.split(';').collect();
        if parts.len() < 2 {
            continue;
        }
        let url_part = parts[0].trim();
        if !parts[1..].iter().any(|part| part.trim() == "rel=\"next\"") {
            continue;
        }
        if let Some(start) = url_part.find('<')
            && let Some(end) = url_part.find('>')
            && let Ok(url) = Url::parse(&url_part[start + 1..end])
        {
            return url
                .query_pairs()
                .find(|(key, _)| key == "page_info")
                .map(|(_, value)| value.into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    use crate::models::product::ProductStatus;

    fn ctx() -> SourceContext {
        SourceContext {
            base_url: "https://demo.myshopify.com".into(),
            credentials: json!({"access_token": "shpat"}),
            currency: Some("EUR".into()),
            page_size: 250,
        }
    }

    fn ingestor() -> ShopifyIngestor {
        ShopifyIngestor::new(reqwest::Client::new(), &SyncConfig::default())
    }

    #[test]
    fn link_header_next_page_info() {
        let header = "<https://demo.myshopify.com/admin/api/2024-01/products.json?limit=250&page_info=prev1>; rel=\"previous\", <https://demo.myshopify.com/admin/api/2024-01/products.json?limit=250&page_info=next2>; rel=\"next\"";
        assert_eq!(parse_link_header(header).as_deref(), Some("next2"));
        assert_eq!(
            parse_link_header("<https://x/products.json?page_info=a>; rel=\"previous\""),
            None
        );
        assert_eq!(parse_link_header(""), None);
    }

    #[test]
    fn product_normalization_promotes_first_variant() {
        let product = parse_product(
            &json!({
                "id": 100,
                "title": "Red Shirt",
                "body_html": "<p>Soft</p>",
                "vendor": "Acme",
                "product_type": "Shirts",
                "handle": "red-shirt",
                "tags": "summer, sale",
                "images": [{"src": "https://cdn/a.jpg"}, {"src": "https://cdn/b.jpg"}],
                "variants": [
                    {"id": 1, "price": "19.99", "sku": "RS-1", "inventory_quantity": 5, "inventory_management": "shopify"},
                    {"id": 2, "price": "21.00", "sku": "RS-2"}
                ]
            }),
            None,
        )
        .unwrap();

        assert_eq!(product.external_id, "100");
        assert_eq!(product.price, Decimal::from_str("19.99").unwrap());
        assert_eq!(product.sku.as_deref(), Some("RS-1"));
        assert_eq!(product.currency, "USD");
        assert_eq!(product.brand.as_deref(), Some("Acme"));
        assert_eq!(product.images.len(), 2);
        assert_eq!(product.metadata["handle"], "red-shirt");
        assert_eq!(product.metadata["tags"], json!(["summer", "sale"]));
        assert_eq!(product.metadata["raw_variants"][1]["sku"], "RS-2");
        assert_eq!(product.status(), ProductStatus::Active);
    }

    #[test]
    fn webhook_topics_route_to_events() {
        let shopify = ingestor();
        let upsert = shopify
            .parse_webhook(&ctx(), "products/update", br#"{"id": 7, "title": "Cap", "variants": []}"#)
            .unwrap();
        match upsert {
            IngestEvent::ProductUpsert(product) => assert_eq!(product.currency, "EUR"),
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(
            shopify
                .parse_webhook(&ctx(), "products/delete", br#"{"id": 7}"#)
                .unwrap(),
            IngestEvent::ProductDelete {
                external_id: "7".into()
            }
        );
        assert_eq!(
            shopify
                .parse_webhook(
                    &ctx(),
                    "inventory_levels/update",
                    br#"{"inventory_item_id": 11, "location_id": 22, "available": 3}"#
                )
                .unwrap(),
            IngestEvent::InventoryUpdate {
                inventory_item_id: "11".into(),
                location_id: "22".into(),
                available: Some(3)
            }
        );
        assert_eq!(
            shopify.parse_webhook(&ctx(), "app/uninstalled", b"{}").unwrap(),
            IngestEvent::AppUninstalled
        );
    }

    #[test]
    fn malformed_webhook_is_bad_payload() {
        let result = ingestor().parse_webhook(&ctx(), "products/create", b"not json");
        assert!(matches!(result, Err(IngestError::BadPayload(_))));
        let result = ingestor().parse_webhook(&ctx(), "products/create", br#"{"title": "x"}"#);
        assert!(matches!(result, Err(IngestError::BadPayload(_))));
    }
}
