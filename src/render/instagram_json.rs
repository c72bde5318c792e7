//! Instagram shopping JSON document.

use serde::Serialize;

use super::FeedItem;
use crate::error::PipelineError;

pub const JSON_FEED_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    products: Vec<JsonProduct<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonProduct<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    availability: &'a str,
    condition: &'a str,
    price: &'a str,
    link: &'a str,
    image_link: &'a str,
    brand: Option<&'a str>,
    additional_image_link: &'a [String],
    google_product_category: Option<&'a str>,
    gender: Option<&'a str>,
    color: Option<&'a str>,
    size: Option<&'a str>,
    age_group: Option<&'a str>,
}

impl<'a> From<&'a FeedItem> for JsonProduct<'a> {
    fn from(item: &'a FeedItem) -> Self {
        Self {
            id: &item.id,
            title: &item.title,
            description: &item.description,
            availability: item.availability,
            condition: &item.condition,
            price: &item.price,
            link: &item.link,
            image_link: &item.image_link,
            brand: item.brand.as_deref(),
            additional_image_link: &item.additional_images,
            google_product_category: item.google_product_category.as_deref(),
            gender: item.gender.as_deref(),
            color: item.color.as_deref(),
            size: item.size.as_deref(),
            age_group: item.age_group.as_deref(),
        }
    }
}

/// `{version, products[]}` with fields in a fixed order.
pub fn render_json(items: &[FeedItem]) -> Result<Vec<u8>, PipelineError> {
    let feed = JsonFeed {
        version: JSON_FEED_VERSION,
        products: items.iter().map(JsonProduct::from).collect(),
    };
    serde_json::to_vec_pretty(&feed).map_err(|e| PipelineError::Render(e.to_string()))
}
