//! Product entity model
//!
//! Normalized products keyed by `(connector_id, external_id)`. Variants are embedded as a
//! JSON array of [`Variant`] records and the source payload's extra fields live in `metadata`.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    pub connector_id: Uuid,

    /// Identifier of the product in the source system
    pub external_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Price of the first variant
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,

    pub currency: String,

    pub sku: Option<String>,

    pub brand: Option<String>,

    pub category: Option<String>,

    /// Ordered image URLs
    #[sea_orm(column_type = "JsonBinary")]
    pub images: JsonValue,

    #[sea_orm(column_type = "JsonBinary")]
    pub variants: JsonValue,

    /// handle, tags, collections, seo fields and the raw source variants
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    /// active|inactive|out_of_stock|archived|draft
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connector::Entity",
        from = "Column::ConnectorId",
        to = "super::connector::Column::Id"
    )]
    Connector,
}

impl Related<super::connector::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connector.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A sellable SKU embedded in a product.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Variant {
    pub variant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// `None` when the upstream payload omitted the quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_management: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
}

impl Model {
    /// Embedded variants; malformed entries are skipped.
    pub fn variant_list(&self) -> Vec<Variant> {
        match &self.variants {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn image_list(&self) -> Vec<String> {
        match &self.images {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Stock summed across variants; omitted quantities count as zero.
    pub fn total_stock(&self) -> i64 {
        self.variant_list()
            .iter()
            .map(|variant| variant.inventory_quantity.unwrap_or(0).max(0))
            .sum()
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(key))
            .and_then(JsonValue::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn handle(&self) -> Option<&str> {
        self.metadata_str("handle")
    }

    pub fn tags(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("tags"))
            .and_then(JsonValue::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| tag.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parsed_status(&self) -> ProductStatus {
        self.status.parse().unwrap_or(ProductStatus::Inactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
    OutOfStock,
    Archived,
    Draft,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
            ProductStatus::OutOfStock => "out_of_stock",
            ProductStatus::Archived => "archived",
            ProductStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            "out_of_stock" => Ok(ProductStatus::OutOfStock),
            "archived" => Ok(ProductStatus::Archived),
            "draft" => Ok(ProductStatus::Draft),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}
