//! Feed entity model
//!
//! A feed is a persisted output definition: channel, wire format, optional connector scope
//! and the declarative filter stored under `settings.filter`.

use std::{fmt, str::FromStr};

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::filter::FeedFilter;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "feeds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    /// Restricts the feed to one connector; `None` selects products from any connector
    pub connector_id: Option<Uuid>,

    pub name: String,

    /// google|facebook|instagram
    pub channel: String,

    /// xml|csv|json
    pub format: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub settings: JsonValue,

    /// `generating` marks an in-flight run and doubles as the per-feed lock
    pub status: String,

    pub products_count: i32,

    pub last_generated: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::generation_run::Entity")]
    GenerationRun,
    #[sea_orm(has_one = "super::feed_schedule::Entity")]
    FeedSchedule,
}

impl Related<super::generation_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GenerationRun.def()
    }
}

impl Related<super::feed_schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FeedSchedule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The filter stored in `settings.filter`; an absent or malformed filter selects everything.
    pub fn filter(&self) -> FeedFilter {
        self.settings
            .get("filter")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn parsed_channel(&self) -> FeedChannel {
        self.channel.parse().unwrap_or(FeedChannel::Google)
    }

    pub fn parsed_format(&self) -> FeedFormat {
        self.format.parse().unwrap_or(FeedFormat::Xml)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeedChannel {
    Google,
    Facebook,
    Instagram,
}

impl FeedChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedChannel::Google => "google",
            FeedChannel::Facebook => "facebook",
            FeedChannel::Instagram => "instagram",
        }
    }

    /// Wire format a channel's consumers expect when the feed does not say otherwise.
    pub fn default_format(&self) -> FeedFormat {
        match self {
            FeedChannel::Google => FeedFormat::Xml,
            FeedChannel::Facebook => FeedFormat::Csv,
            FeedChannel::Instagram => FeedFormat::Json,
        }
    }
}

impl fmt::Display for FeedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedChannel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" | "google_shopping" => Ok(FeedChannel::Google),
            "facebook" => Ok(FeedChannel::Facebook),
            "instagram" => Ok(FeedChannel::Instagram),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Xml,
    Csv,
    Json,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Xml => "xml",
            FeedFormat::Csv => "csv",
            FeedFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FeedFormat::Xml => "application/xml; charset=utf-8",
            FeedFormat::Csv => "text/csv; charset=utf-8",
            FeedFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(FeedFormat::Xml),
            "csv" => Ok(FeedFormat::Csv),
            "json" => Ok(FeedFormat::Json),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}

pub const FEED_STATUS_ACTIVE: &str = "active";
pub const FEED_STATUS_GENERATING: &str = "generating";
pub const FEED_STATUS_ERROR: &str = "error";
