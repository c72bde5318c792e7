//! Connector entity model
//!
//! A connector is one configured link to an external product source (a Shopify shop,
//! a WooCommerce site or a CSV document) for an organization.

use std::{fmt, str::FromStr};

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connectors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    /// Source kind (shopify|woocommerce|csv)
    pub kind: String,

    /// Shop host for platform sources; the document URL for CSV sources
    pub shop_domain: String,

    /// Sealed credentials document, see [`crate::crypto::open_credentials`]
    pub credentials_ciphertext: Option<Vec<u8>>,

    /// Shop currency, when the source reported one
    pub currency: Option<String>,

    /// Lifecycle status (active|pending|inactive)
    pub status: String,

    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// Listing cursor left behind by a pull sync that stopped at the page cap
    pub sync_cursor: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product::Entity")]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Supported source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Shopify,
    Woocommerce,
    Csv,
}

impl ConnectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Shopify => "shopify",
            ConnectorKind::Woocommerce => "woocommerce",
            ConnectorKind::Csv => "csv",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shopify" => Ok(ConnectorKind::Shopify),
            "woocommerce" => Ok(ConnectorKind::Woocommerce),
            "csv" => Ok(ConnectorKind::Csv),
            other => Err(format!("unknown connector kind '{other}'")),
        }
    }
}

/// Connector lifecycle: created `pending`, `active` after a credential check, `inactive` on uninstall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    Active,
    Pending,
    Inactive,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorStatus::Active => "active",
            ConnectorStatus::Pending => "pending",
            ConnectorStatus::Inactive => "inactive",
        }
    }
}
