//! Feed filter evaluation.
//!
//! A [`FeedFilter`] is the declarative include/exclude document stored on a feed. It compiles
//! to a parameterized SeaORM [`Condition`] over the products table: every user-supplied value
//! is bound as a positional argument, never spliced into SQL text.

use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseBackend, EntityTrait, QueryFilter, QueryOrder, Select,
    QueryTrait, Value,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::product::{self, ProductStatus};

/// Statuses no feed ever includes. Soft-deleted (`inactive`) products are out as well.
pub const EXCLUDED_STATUSES: [ProductStatus; 4] = [
    ProductStatus::Inactive,
    ProductStatus::OutOfStock,
    ProductStatus::Archived,
    ProductStatus::Draft,
];

pub(crate) const LIKE_ESCAPE: char = '!';

/// Include/exclude rules for the products of a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct FeedFilter {
    /// Inclusive lower bound; zero means unset
    #[schema(value_type = Option<f64>)]
    pub min_price: Option<Decimal>,
    /// Inclusive upper bound; zero means unset
    #[schema(value_type = Option<f64>)]
    pub max_price: Option<Decimal>,
    pub brands: Vec<String>,
    pub categories: Vec<String>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub include_collections: Vec<String>,
    pub exclude_collections: Vec<String>,
    /// Product UUIDs or upstream external ids that never appear in the feed
    pub exclude_product_ids: Vec<String>,
}

/// Which products a feed may draw from.
#[derive(Debug, Clone, Copy)]
pub struct FilterScope {
    pub organization_id: Uuid,
    pub connector_id: Option<Uuid>,
}

impl FeedFilter {
    /// Condition selecting the products this filter admits within `scope`.
    pub fn condition(&self, scope: FilterScope) -> Condition {
        scope_condition(scope)
            .add(product::Column::Status.is_not_in(EXCLUDED_STATUSES.iter().map(|s| s.as_str())))
            .add(self.rules())
    }

    fn rules(&self) -> Condition {
        let mut condition = Condition::all();

        if let Some(min) = self.min_price.filter(|value| !value.is_zero()) {
            condition = condition.add(product::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price.filter(|value| !value.is_zero()) {
            condition = condition.add(product::Column::Price.lte(max));
        }

        let brands = non_empty(&self.brands);
        if !brands.is_empty() {
            condition = condition.add(product::Column::Brand.is_in(brands));
        }
        let categories = non_empty(&self.categories);
        if !categories.is_empty() {
            condition = condition.add(product::Column::Category.is_in(categories));
        }

        // Each include list is one OR group; the tag and collection groups must both hold.
        for included in [&self.include_tags, &self.include_collections] {
            let names = non_empty(included);
            if !names.is_empty() {
                let any = names
                    .into_iter()
                    .fold(Condition::any(), |any, name| any.add(metadata_contains(name)));
                condition = condition.add(any);
            }
        }

        for name in non_empty(&self.exclude_tags)
            .into_iter()
            .chain(non_empty(&self.exclude_collections))
        {
            condition = condition.add(metadata_lacks(name));
        }

        let (uuids, external_ids): (Vec<&str>, Vec<&str>) = non_empty(&self.exclude_product_ids)
            .into_iter()
            .partition(|id| Uuid::parse_str(id).is_ok());
        if !uuids.is_empty() {
            let ids: Vec<Uuid> = uuids.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect();
            condition = condition.add(product::Column::Id.is_not_in(ids));
        }
        if !external_ids.is_empty() {
            condition = condition.add(product::Column::ExternalId.is_not_in(external_ids));
        }

        condition
    }

    /// Filtered products in the order every renderer sees them.
    pub fn select(&self, scope: FilterScope) -> Select<product::Entity> {
        product::Entity::find()
            .filter(self.condition(scope))
            .order_by_desc(product::Column::CreatedAt)
            .order_by_desc(product::Column::Id)
    }

    /// SQL text and positional arguments of [`FeedFilter::select`] for a backend.
    pub fn to_sql(&self, scope: FilterScope, backend: DatabaseBackend) -> (String, Vec<Value>) {
        let statement = self.select(scope).build(backend);
        let values = statement.values.map(|values| values.0).unwrap_or_default();
        (statement.sql, values)
    }
}

/// Every product of the scope regardless of status; the denominator of run statistics.
pub fn scope_condition(scope: FilterScope) -> Condition {
    let condition =
        Condition::all().add(product::Column::OrganizationId.eq(scope.organization_id));
    match scope.connector_id {
        Some(connector_id) => condition.add(product::Column::ConnectorId.eq(connector_id)),
        None => condition,
    }
}

fn non_empty(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}

/// `%"name"%` with LIKE metacharacters escaped. The name is JSON-encoded so it matches the
/// serialized metadata exactly, quotes included.
pub(crate) fn quoted_pattern(name: &str) -> String {
    let encoded = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""));
    let mut pattern = String::with_capacity(encoded.len() + 2);
    pattern.push('%');
    for ch in encoded.chars() {
        if matches!(ch, '%' | '_') || ch == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn metadata_contains(name: &str) -> SimpleExpr {
    Expr::cust_with_values(
        format!("CAST(metadata AS TEXT) LIKE ? ESCAPE '{LIKE_ESCAPE}'"),
        [quoted_pattern(name)],
    )
}

fn metadata_lacks(name: &str) -> SimpleExpr {
    Expr::cust_with_values(
        format!("(metadata IS NULL OR CAST(metadata AS TEXT) NOT LIKE ? ESCAPE '{LIKE_ESCAPE}')"),
        [quoted_pattern(name)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn scope() -> FilterScope {
        FilterScope {
            organization_id: Uuid::nil(),
            connector_id: None,
        }
    }

    #[test]
    fn filter_deserializes_numbers_and_missing_fields() {
        let filter: FeedFilter =
            serde_json::from_value(serde_json::json!({"min_price": 10, "brands": ["Acme"]}))
                .unwrap();
        assert_eq!(filter.min_price, Some(Decimal::from(10)));
        assert_eq!(filter.max_price, None);
        assert_eq!(filter.brands, vec!["Acme".to_string()]);
    }

    #[test]
    fn values_are_bound_not_inlined() {
        let filter = FeedFilter {
            min_price: Some(Decimal::from_str("10").unwrap()),
            brands: vec!["Acme'; DROP TABLE products; --".to_string()],
            exclude_tags: vec!["clearance".to_string()],
            ..FeedFilter::default()
        };
        let (sql, values) = filter.to_sql(scope(), DatabaseBackend::Postgres);
        assert!(!sql.contains("DROP TABLE"));
        assert!(!sql.contains("clearance"));
        assert!(sql.contains("$1"));
        assert!(sql.contains("NOT LIKE"));
        assert!(sql.contains("ORDER BY"));
        assert!(values.len() >= 6);
    }

    #[test]
    fn zero_price_bounds_are_unset() {
        let zero = FeedFilter {
            min_price: Some(Decimal::ZERO),
            max_price: Some(Decimal::ZERO),
            ..FeedFilter::default()
        };
        let (with_zero, _) = zero.to_sql(scope(), DatabaseBackend::Sqlite);
        let (empty, _) = FeedFilter::default().to_sql(scope(), DatabaseBackend::Sqlite);
        assert_eq!(with_zero, empty);
    }

    #[test]
    fn default_status_exclusion_is_always_present() {
        let (sql, values) = FeedFilter::default().to_sql(scope(), DatabaseBackend::Sqlite);
        assert!(sql.contains("NOT IN"));
        let rendered: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
        for status in ["inactive", "out_of_stock", "archived", "draft"] {
            assert!(rendered.iter().any(|v| v.contains(status)), "{status}");
        }
    }

    #[test]
    fn tag_patterns_are_quoted_and_escaped() {
        assert_eq!(quoted_pattern("clearance"), "%\"clearance\"%");
        assert_eq!(quoted_pattern("50%_off"), "%\"50!%!_off\"%");
        assert_eq!(quoted_pattern("a!b"), "%\"a!!b\"%");
    }
}
