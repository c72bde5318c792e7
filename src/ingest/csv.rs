//! CSV document ingestor.
//!
//! The connector's `shop_domain` is the URL of a CSV document with a header row:
//! `id,title,description,price,currency,sku,brand,category,image_link,tags,quantity,status,handle`.
//! Only `id` and `title` are required. `image_link` holds `|` separated URLs and `tags` a comma
//! separated list. The whole document is one page.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::{debug, warn};

use super::canonical::{
    self, CanonicalProduct, DEFAULT_CURRENCY, metadata_document, split_tags,
};
use super::trait_::{IngestEvent, Ingestor, ProductPage};
use super::{IngestError, SourceContext};
use crate::config::SyncConfig;
use crate::models::connector::ConnectorKind;
use crate::models::product::Variant;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    id: String,
    title: String,
    description: Option<String>,
    price: Option<String>,
    currency: Option<String>,
    sku: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    image_link: Option<String>,
    tags: Option<String>,
    quantity: Option<String>,
    status: Option<String>,
    handle: Option<String>,
}

pub struct CsvIngestor {
    client: reqwest::Client,
    listing_timeout: Duration,
}

impl CsvIngestor {
    pub fn new(client: reqwest::Client, sync: &SyncConfig) -> Self {
        Self {
            client,
            listing_timeout: Duration::from_secs(sync.listing_timeout_seconds),
        }
    }
}

#[async_trait]
impl Ingestor for CsvIngestor {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Csv
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        _cursor: Option<String>,
    ) -> Result<ProductPage, IngestError> {
        let response = self
            .client
            .get(&ctx.base_url)
            .timeout(self.listing_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.bytes().await?;
        let products = parse_document(&body, ctx.currency.as_deref())?;
        debug!(count = products.len(), "Parsed CSV product document");

        Ok(ProductPage {
            products,
            next_cursor: None,
        })
    }

    fn parse_webhook(
        &self,
        _ctx: &SourceContext,
        topic: &str,
        _body: &[u8],
    ) -> Result<IngestEvent, IngestError> {
        Ok(IngestEvent::Ignored {
            topic: topic.to_string(),
        })
    }
}

/// Parses a whole CSV document. Rows without an id or title are skipped with a warning.
pub fn parse_document(
    document: &[u8],
    fallback_currency: Option<&str>,
) -> Result<Vec<CanonicalProduct>, IngestError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(document);

    let headers = reader
        .headers()
        .map_err(|e| IngestError::BadPayload(format!("unreadable CSV header: {e}")))?;
    if !headers.iter().any(|h| h == "id") || !headers.iter().any(|h| h == "title") {
        return Err(IngestError::BadPayload(
            "CSV header must contain id and title columns".into(),
        ));
    }

    let mut products = Vec::new();
    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                warn!(row = index + 2, error = %e, "Skipping unreadable CSV row");
                continue;
            }
        };
        if row.id.is_empty() || row.title.is_empty() {
            warn!(row = index + 2, "Skipping CSV row without id or title");
            continue;
        }
        products.push(row_to_product(row, fallback_currency));
    }
    Ok(products)
}

fn row_to_product(row: CsvRow, fallback_currency: Option<&str>) -> CanonicalProduct {
    let filled = |value: Option<String>| value.filter(|v| !v.is_empty());

    let price = filled(row.price).and_then(|raw| Decimal::from_str(&raw).ok());
    let quantity = filled(row.quantity).and_then(|raw| raw.parse::<i64>().ok());
    let sku = filled(row.sku);

    let variant = Variant {
        variant_id: row.id.clone(),
        price,
        sku: sku.clone(),
        inventory_quantity: quantity,
        inventory_management: quantity.map(|_| "csv".to_string()),
        ..Variant::default()
    };

    let images = filled(row.image_link)
        .map(|raw| {
            raw.split('|')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let tags = filled(row.tags).map(|raw| split_tags(&raw)).unwrap_or_default();

    CanonicalProduct {
        external_id: row.id,
        title: row.title,
        description: filled(row.description),
        price: price.unwrap_or_default(),
        currency: filled(row.currency)
            .or_else(|| fallback_currency.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        sku,
        brand: filled(row.brand),
        category: filled(row.category),
        images,
        variants: vec![variant],
        metadata: metadata_document(filled(row.handle), tags, Vec::new(), JsonValue::Array(Vec::new())),
        upstream_status: canonical::upstream_status(filled(row.status).as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::ProductStatus;
    use serde_json::json;

    #[test]
    fn parses_quoted_fields_and_lists() {
        let document = b"id,title,description,price,sku,brand,image_link,tags,quantity\n\
            A1,\"Mug, large\",\"Says \"\"hi\"\"\",9.50,M-1,Acme,https://cdn/1.jpg|https://cdn/2.jpg,\"gift, kitchen\",4\n";
        let products = parse_document(document, Some("EUR")).unwrap();
        assert_eq!(products.len(), 1);

        let mug = &products[0];
        assert_eq!(mug.title, "Mug, large");
        assert_eq!(mug.description.as_deref(), Some("Says \"hi\""));
        assert_eq!(mug.price, Decimal::from_str("9.50").unwrap());
        assert_eq!(mug.currency, "EUR");
        assert_eq!(mug.images.len(), 2);
        assert_eq!(mug.metadata["tags"], json!(["gift", "kitchen"]));
        assert_eq!(mug.variants[0].inventory_quantity, Some(4));
        assert_eq!(mug.status(), ProductStatus::Active);
    }

    #[test]
    fn rows_without_identity_are_skipped() {
        let document = b"id,title,price\n,Nameless,1\nB2,,2\nB3,Kept,3\n";
        let products = parse_document(document, None).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].external_id, "B3");
        assert_eq!(products[0].currency, "USD");
    }

    #[test]
    fn header_without_id_is_rejected() {
        let result = parse_document(b"name,price\nx,1\n", None);
        assert!(matches!(result, Err(IngestError::BadPayload(_))));
    }

    #[test]
    fn zero_quantity_marks_row_out_of_stock() {
        let products = parse_document(b"id,title,quantity\nC1,Hat,0\n", None).unwrap();
        assert_eq!(products[0].status(), ProductStatus::OutOfStock);
    }
}
