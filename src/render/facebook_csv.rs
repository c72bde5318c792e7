//! Facebook catalog CSV.

use super::FeedItem;
use crate::error::PipelineError;

/// Fixed header row; the catalog importer matches columns by name and order.
pub const CSV_HEADER: [&str; 24] = [
    "id",
    "title",
    "description",
    "availability",
    "condition",
    "price",
    "link",
    "image_link",
    "brand",
    "google_product_category",
    "fb_product_category",
    "quantity_to_sell_on_facebook",
    "sale_price",
    "sale_price_effective_date",
    "item_group_id",
    "gender",
    "color",
    "size",
    "age_group",
    "material",
    "pattern",
    "shipping",
    "shipping_weight",
    "additional_image_link",
];

pub fn render_csv(items: &[FeedItem]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = ::csv::WriterBuilder::new()
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(256 + items.len() * 512));
    writer.write_record(CSV_HEADER).map_err(csv_error)?;

    for item in items {
        let opt = |value: &Option<String>| value.clone().unwrap_or_default();
        writer
            .write_record([
                item.id.clone(),
                item.title.clone(),
                item.description.clone(),
                item.availability.to_string(),
                item.condition.clone(),
                item.price.clone(),
                item.link.clone(),
                item.image_link.clone(),
                opt(&item.brand),
                opt(&item.google_product_category),
                opt(&item.fb_product_category),
                item.quantity.max(0).to_string(),
                String::new(),
                String::new(),
                opt(&item.item_group_id),
                opt(&item.gender),
                opt(&item.color),
                opt(&item.size),
                opt(&item.age_group),
                opt(&item.material),
                opt(&item.pattern),
                String::new(),
                String::new(),
                item.additional_images.join(","),
            ])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Render(format!("csv flush failed: {}", e.error())))
}

fn csv_error(error: ::csv::Error) -> PipelineError {
    PipelineError::Render(format!("csv write failed: {error}"))
}

#[cfg(test)]
mod tests {
    use super::super::feed_items;
    use super::super::fixtures::{ctx, product};
    use super::*;

    #[test]
    fn header_row_is_fixed() {
        let csv = String::from_utf8(render_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv.lines().next().unwrap(), CSV_HEADER.join(","));
    }

    #[test]
    fn rows_follow_header_columns() {
        let mut p = product("9", "Shirt, Red", "19.99");
        p.description = Some("The \"best\" shirt".into());
        let items = feed_items(&ctx(), &[p]);
        let csv = String::from_utf8(render_csv(&items).unwrap()).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("9,\"Shirt, Red\",\"The \"\"best\"\" shirt\",in stock,new,19.99 USD,"));

        let mut reader = ::csv::Reader::from_reader(csv.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), CSV_HEADER.len());
        assert_eq!(&record[1], "Shirt, Red");
        assert_eq!(&record[11], "5");
    }
}
