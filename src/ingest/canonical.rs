//! Source-independent product record and the normalization helpers shared by ingestors.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Value as JsonValue, json};

use crate::models::product::{ProductStatus, Variant};

pub const DEFAULT_CURRENCY: &str = "USD";

/// A product as every ingestor hands it to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProduct {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<Variant>,
    /// handle, tags, collections and the raw source variants
    pub metadata: JsonValue,
    /// Publication state reported by the source (active, draft or archived)
    pub upstream_status: ProductStatus,
}

impl CanonicalProduct {
    /// Promotes the first variant's price and SKU onto the product when present.
    pub fn promote_first_variant(&mut self) {
        if let Some(first) = self.variants.first() {
            if let Some(price) = first.price {
                self.price = price;
            }
            if first.sku.is_some() {
                self.sku = first.sku.clone();
            }
        }
    }

    /// Status to store: draft and archived come from the source, the rest from stock.
    pub fn status(&self) -> ProductStatus {
        match self.upstream_status {
            ProductStatus::Draft | ProductStatus::Archived | ProductStatus::Inactive => {
                self.upstream_status
            }
            _ if is_sold_out(&self.variants) => ProductStatus::OutOfStock,
            _ => ProductStatus::Active,
        }
    }
}

/// Maps a source publication status onto the product lifecycle.
pub fn upstream_status(raw: Option<&str>) -> ProductStatus {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("draft") | Some("pending") | Some("private") => ProductStatus::Draft,
        Some("archived") | Some("trash") => ProductStatus::Archived,
        _ => ProductStatus::Active,
    }
}

/// True when inventory is tracked for the variant.
pub fn is_managed(variant: &Variant) -> bool {
    variant
        .inventory_management
        .as_deref()
        .is_some_and(|management| !management.is_empty() && management != "not_managed")
}

/// Every variant is tracked, none allow backorders, and the summed stock is exhausted.
pub fn is_sold_out(variants: &[Variant]) -> bool {
    if variants.is_empty() || !variants.iter().all(is_managed) {
        return false;
    }
    let backorders = variants
        .iter()
        .any(|variant| variant.inventory_policy.as_deref() == Some("continue"));
    let stock: i64 = variants
        .iter()
        .map(|variant| variant.inventory_quantity.unwrap_or(0))
        .sum();
    !backorders && stock <= 0
}

/// Reads a price given either as a JSON string (`"19.99"`) or a number.
pub fn decimal_from(value: Option<&JsonValue>) -> Option<Decimal> {
    match value? {
        JsonValue::String(raw) if !raw.trim().is_empty() => Decimal::from_str(raw.trim()).ok(),
        JsonValue::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    }
}

/// Reads an identifier given either as a JSON number or string.
pub fn string_id(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(raw) if !raw.is_empty() => Some(raw.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub fn non_empty_str(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Splits a comma separated tag string (`"sale, summer"`) into trimmed names.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase ASCII slug used for handles and links.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Builds the metadata document shared by every source.
pub fn metadata_document(
    handle: Option<String>,
    tags: Vec<String>,
    collections: Vec<String>,
    raw_variants: JsonValue,
) -> JsonValue {
    let mut metadata = json!({
        "tags": tags,
        "collections": collections,
        "raw_variants": raw_variants,
    });
    if let Some(handle) = handle {
        metadata["handle"] = JsonValue::String(handle);
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(quantity: Option<i64>, management: Option<&str>, policy: Option<&str>) -> Variant {
        Variant {
            variant_id: "1".into(),
            inventory_quantity: quantity,
            inventory_management: management.map(str::to_string),
            inventory_policy: policy.map(str::to_string),
            ..Variant::default()
        }
    }

    #[test]
    fn sold_out_requires_every_variant_tracked() {
        assert!(is_sold_out(&[variant(Some(0), Some("shopify"), None)]));
        assert!(!is_sold_out(&[
            variant(Some(0), Some("shopify"), None),
            variant(Some(0), None, None),
        ]));
        assert!(!is_sold_out(&[variant(Some(0), Some("not_managed"), None)]));
        assert!(!is_sold_out(&[]));
    }

    #[test]
    fn backorders_keep_product_sellable() {
        assert!(!is_sold_out(&[variant(
            Some(0),
            Some("shopify"),
            Some("continue")
        )]));
    }

    #[test]
    fn decimals_parse_from_strings_and_numbers() {
        assert_eq!(
            decimal_from(Some(&json!("19.99"))),
            Some(Decimal::from_str("19.99").unwrap())
        );
        assert_eq!(decimal_from(Some(&json!(5))), Some(Decimal::from(5)));
        assert_eq!(decimal_from(Some(&json!(""))), None);
        assert_eq!(decimal_from(None), None);
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Red Shirt (XL)!"), "red-shirt-xl");
        assert_eq!(slugify("  --A  b--"), "a-b");
    }

    #[test]
    fn upstream_status_mapping() {
        assert_eq!(upstream_status(Some("draft")), ProductStatus::Draft);
        assert_eq!(upstream_status(Some("ARCHIVED")), ProductStatus::Archived);
        assert_eq!(upstream_status(Some("trash")), ProductStatus::Archived);
        assert_eq!(upstream_status(Some("publish")), ProductStatus::Active);
        assert_eq!(upstream_status(None), ProductStatus::Active);
    }
}
