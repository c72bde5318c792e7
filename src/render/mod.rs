//! # Feed Rendering
//!
//! Pure conversion of a product set into the three outbound wire formats. Renderers never
//! touch the database; the same input always yields the same bytes.

pub mod facebook_csv;
pub mod google_xml;
pub mod instagram_json;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PipelineError;
use crate::ingest::canonical::slugify;
use crate::models::feed::{FeedChannel, FeedFormat};
use crate::models::product::{Model as Product, ProductStatus};

pub use facebook_csv::render_csv;
pub use google_xml::render_xml;
pub use instagram_json::render_json;

pub const AVAILABILITY_IN_STOCK: &str = "in stock";
pub const AVAILABILITY_OUT_OF_STOCK: &str = "out of stock";
pub const DEFAULT_CONDITION: &str = "new";
pub const MAX_ADDITIONAL_IMAGES: usize = 10;

/// Feed-independent settings the renderers need.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Origin that product links are built on, without trailing slash
    pub storefront_base: String,
    pub placeholder_image: String,
    /// Channel title of the XML document
    pub feed_name: String,
}

impl RenderContext {
    pub fn new(
        storefront_base: impl Into<String>,
        placeholder_image: impl Into<String>,
        feed_name: impl Into<String>,
    ) -> Self {
        Self {
            storefront_base: storefront_base.into().trim_end_matches('/').to_string(),
            placeholder_image: placeholder_image.into(),
            feed_name: feed_name.into(),
        }
    }
}

/// A product flattened into the fields every format draws from.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub availability: &'static str,
    pub condition: String,
    pub price: String,
    pub link: String,
    pub image_link: String,
    pub uses_placeholder_image: bool,
    pub additional_images: Vec<String>,
    pub brand: Option<String>,
    pub gtin: Option<String>,
    pub mpn: Option<String>,
    pub google_product_category: Option<String>,
    pub fb_product_category: Option<String>,
    pub product_type: Option<String>,
    pub quantity: i64,
    pub item_group_id: Option<String>,
    pub gender: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub age_group: Option<String>,
    pub material: Option<String>,
    pub pattern: Option<String>,
}

impl FeedItem {
    pub fn from_product(ctx: &RenderContext, product: &Product) -> Self {
        let images = product.image_list();
        let (image_link, uses_placeholder_image) = match images.first() {
            Some(first) => (first.clone(), false),
            None => (ctx.placeholder_image.clone(), true),
        };
        let variants = product.variant_list();
        let attribute = |key: &str| product.metadata_str(key).map(str::to_string);

        Self {
            id: product.external_id.clone(),
            title: product.title.clone(),
            description: product.description.clone().unwrap_or_default(),
            availability: availability(product),
            condition: attribute("condition").unwrap_or_else(|| DEFAULT_CONDITION.to_string()),
            price: format_price(product.price, &product.currency),
            link: product_link(ctx, product),
            image_link,
            uses_placeholder_image,
            additional_images: images
                .iter()
                .skip(1)
                .take(MAX_ADDITIONAL_IMAGES)
                .cloned()
                .collect(),
            brand: product.brand.clone().filter(|b| !b.trim().is_empty()),
            gtin: variants
                .iter()
                .find_map(|v| v.barcode.clone())
                .filter(|b| !b.trim().is_empty()),
            mpn: product.sku.clone().filter(|s| !s.trim().is_empty()),
            google_product_category: attribute("google_product_category"),
            fb_product_category: attribute("fb_product_category"),
            product_type: product.category.clone().filter(|c| !c.trim().is_empty()),
            quantity: product.total_stock(),
            item_group_id: (variants.len() > 1).then(|| product.external_id.clone()),
            gender: attribute("gender"),
            color: attribute("color"),
            size: attribute("size"),
            age_group: attribute("age_group"),
            material: attribute("material"),
            pattern: attribute("pattern"),
        }
    }
}

/// `in stock` only for an active product with positive summed stock.
pub fn availability(product: &Product) -> &'static str {
    if product.parsed_status() == ProductStatus::Active && product.total_stock() > 0 {
        AVAILABILITY_IN_STOCK
    } else {
        AVAILABILITY_OUT_OF_STOCK
    }
}

/// `<base>/products/<handle>`, slugifying the title when no handle is stored.
pub fn product_link(ctx: &RenderContext, product: &Product) -> String {
    let handle = match product.handle() {
        Some(handle) => handle.to_string(),
        None => slugify(&product.title),
    };
    format!("{}/products/{}", ctx.storefront_base, handle)
}

/// `"24.99 USD"`: two decimals, then the ISO currency.
pub fn format_price(price: Decimal, currency: &str) -> String {
    format!("{:.2} {}", price.round_dp(2), currency)
}

/// A required field a channel would reject, reported per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationIssue {
    pub product_id: String,
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(product_id: &str, field: &str, message: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Structural problems of each item for `channel`. Never blocks rendering.
pub fn validate(channel: FeedChannel, items: &[FeedItem], products: &[Product]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (item, product) in items.iter().zip(products) {
        let id = item.id.as_str();
        if item.title.trim().is_empty() {
            issues.push(ValidationIssue::new(id, "title", "title is required"));
        }
        if item.description.trim().is_empty() {
            issues.push(ValidationIssue::new(id, "description", "description is required"));
        }
        if item.uses_placeholder_image {
            issues.push(ValidationIssue::new(
                id,
                "image_link",
                "no product image; placeholder used",
            ));
        }
        if product.price <= Decimal::ZERO {
            issues.push(ValidationIssue::new(id, "price", "price must be positive"));
        }
        if product.currency.trim().len() != 3 {
            issues.push(ValidationIssue::new(id, "price", "currency must be an ISO 4217 code"));
        }
        match channel {
            FeedChannel::Google => {
                if item.brand.is_none() && item.gtin.is_none() && item.mpn.is_none() {
                    issues.push(ValidationIssue::new(
                        id,
                        "brand",
                        "one of brand, gtin or mpn is required",
                    ));
                }
                if item.title.chars().count() > google_xml::MAX_TITLE_CHARS {
                    issues.push(ValidationIssue::new(id, "title", "title exceeds 150 characters"));
                }
            }
            FeedChannel::Facebook | FeedChannel::Instagram => {
                if item.brand.is_none() {
                    issues.push(ValidationIssue::new(id, "brand", "brand is required"));
                }
            }
        }
    }
    issues
}

/// Renders `products` in `format`. Products must already be in feed order.
pub fn render(
    format: FeedFormat,
    ctx: &RenderContext,
    items: &[FeedItem],
) -> Result<Vec<u8>, PipelineError> {
    match format {
        FeedFormat::Xml => Ok(render_xml(ctx, items)),
        FeedFormat::Csv => render_csv(items),
        FeedFormat::Json => render_json(items),
    }
}

pub fn feed_items(ctx: &RenderContext, products: &[Product]) -> Vec<FeedItem> {
    products
        .iter()
        .map(|product| FeedItem::from_product(ctx, product))
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    use crate::models::product::Model as Product;

    pub fn product(external_id: &str, title: &str, price: &str) -> Product {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap().fixed_offset();
        Product {
            id: Uuid::nil(),
            organization_id: Uuid::nil(),
            connector_id: Uuid::nil(),
            external_id: external_id.to_string(),
            title: title.to_string(),
            description: Some(format!("{title} description")),
            price: price.parse::<Decimal>().unwrap(),
            currency: "USD".to_string(),
            sku: Some(format!("SKU-{external_id}")),
            brand: Some("Acme".to_string()),
            category: Some("Shirts".to_string()),
            images: json!([]),
            variants: json!([{
                "variant_id": "1",
                "inventory_quantity": 5,
                "inventory_management": "shopify"
            }]),
            metadata: Some(json!({"tags": [], "collections": []})),
            status: "active".to_string(),
            created_at: created,
            updated_at: created,
        }
    }

    pub fn ctx() -> super::RenderContext {
        super::RenderContext::new(
            "https://shop.example.com/",
            "https://cdn.example.com/placeholder.png",
            "Test Feed",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{ctx, product};
    use super::*;
    use serde_json::json;

    #[test]
    fn availability_needs_active_status_and_stock() {
        let mut p = product("1", "Shirt", "10");
        assert_eq!(availability(&p), AVAILABILITY_IN_STOCK);

        p.variants = json!([{"variant_id": "1", "inventory_quantity": 0}]);
        assert_eq!(availability(&p), AVAILABILITY_OUT_OF_STOCK);

        p.variants = json!([{"variant_id": "1", "inventory_quantity": 3}]);
        p.status = "inactive".into();
        assert_eq!(availability(&p), AVAILABILITY_OUT_OF_STOCK);
    }

    #[test]
    fn link_prefers_handle_over_title_slug() {
        let mut p = product("1", "Red Shirt, Large!", "10");
        assert_eq!(
            product_link(&ctx(), &p),
            "https://shop.example.com/products/red-shirt-large"
        );
        p.metadata = Some(json!({"handle": "red-shirt"}));
        assert_eq!(product_link(&ctx(), &p), "https://shop.example.com/products/red-shirt");
    }

    #[test]
    fn price_has_two_decimals_and_currency() {
        assert_eq!(format_price("24.99".parse().unwrap(), "USD"), "24.99 USD");
        assert_eq!(format_price("10".parse().unwrap(), "EUR"), "10.00 EUR");
        assert_eq!(format_price("3.456".parse().unwrap(), "GBP"), "3.46 GBP");
    }

    #[test]
    fn image_link_falls_back_to_placeholder() {
        let mut p = product("1", "Shirt", "10");
        let item = FeedItem::from_product(&ctx(), &p);
        assert_eq!(item.image_link, "https://cdn.example.com/placeholder.png");
        assert!(item.uses_placeholder_image);

        p.images = json!(["https://img/1.jpg", "https://img/2.jpg"]);
        let item = FeedItem::from_product(&ctx(), &p);
        assert_eq!(item.image_link, "https://img/1.jpg");
        assert_eq!(item.additional_images, vec!["https://img/2.jpg".to_string()]);
    }

    #[test]
    fn additional_images_are_capped() {
        let mut p = product("1", "Shirt", "10");
        p.images = json!((0..15).map(|i| format!("https://img/{i}.jpg")).collect::<Vec<_>>());
        let item = FeedItem::from_product(&ctx(), &p);
        assert_eq!(item.additional_images.len(), MAX_ADDITIONAL_IMAGES);
        assert_eq!(item.additional_images[0], "https://img/1.jpg");
    }

    #[test]
    fn validation_reports_missing_fields_per_channel() {
        let mut p = product("7", "Shirt", "0");
        p.brand = None;
        p.description = None;
        let products = vec![p];
        let items = feed_items(&ctx(), &products);

        let facebook = validate(FeedChannel::Facebook, &items, &products);
        let fields: Vec<&str> = facebook.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"brand"));
        assert!(fields.contains(&"description"));
        assert!(fields.contains(&"price"));
        assert!(fields.contains(&"image_link"));
        assert!(facebook.iter().all(|i| i.product_id == "7"));

        // the SKU doubles as mpn, which satisfies Google's identifier rule
        let google = validate(FeedChannel::Google, &items, &products);
        assert!(!google.iter().any(|i| i.field == "brand"));
    }
}
