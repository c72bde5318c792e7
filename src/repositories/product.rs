//! # Product Repository
//!
//! The product store. Writes go through [`ProductRepository::upsert`], keyed by
//! `(connector_id, external_id)`; products are never deleted, only marked `inactive`.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::is_missing_conflict_target;
use crate::filter::{LIKE_ESCAPE, quoted_pattern};
use crate::ingest::CanonicalProduct;
use crate::ingest::canonical::is_sold_out;
use crate::models::product::{self, ActiveModel, Column, Entity, Model, ProductStatus, Variant};

/// Repository for product database operations
pub struct ProductRepository {
    db: DatabaseConnection,
}

impl ProductRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts the product or updates the row with the same `(connector_id, external_id)`.
    ///
    /// Uses `ON CONFLICT ... DO UPDATE`; schemas without the unique index fall back to a
    /// read-then-write, where a concurrent writer can leave a duplicate that the next ingest
    /// overwrites.
    pub async fn upsert(
        &self,
        organization_id: Uuid,
        connector_id: Uuid,
        product: &CanonicalProduct,
    ) -> Result<Model, DbErr> {
        let active = to_active_model(organization_id, connector_id, product);

        let result = Entity::insert(active.clone())
            .on_conflict(
                OnConflict::columns([Column::ConnectorId, Column::ExternalId])
                    .update_columns([
                        Column::Title,
                        Column::Description,
                        Column::Price,
                        Column::Currency,
                        Column::Sku,
                        Column::Brand,
                        Column::Category,
                        Column::Images,
                        Column::Variants,
                        Column::Metadata,
                        Column::Status,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await;

        match result {
            Ok(_) => {}
            Err(err) if is_missing_conflict_target(&err) => {
                tracing::warn!(
                    connector_id = %connector_id,
                    external_id = %product.external_id,
                    "Product unique index missing; falling back to read-check-write"
                );
                self.read_check_write(connector_id, &product.external_id, active)
                    .await?;
            }
            Err(err) => return Err(err),
        }

        self.find_by_external(connector_id, &product.external_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("product {}", product.external_id)))
    }

    async fn read_check_write(
        &self,
        connector_id: Uuid,
        external_id: &str,
        mut active: ActiveModel,
    ) -> Result<(), DbErr> {
        match self.find_by_external(connector_id, external_id).await? {
            Some(existing) => {
                active.id = Set(existing.id);
                active.created_at = Set(existing.created_at);
                active.update(&self.db).await?;
            }
            None => {
                Entity::insert(active).exec_without_returning(&self.db).await?;
            }
        }
        Ok(())
    }

    pub async fn find_by_external(
        &self,
        connector_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::ConnectorId.eq(connector_id))
            .filter(Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await
    }

    /// Looks a product up by UUID or, failing that, by upstream external id.
    pub async fn find_by_key(
        &self,
        organization_id: Uuid,
        key: &str,
    ) -> Result<Option<Model>, DbErr> {
        let mut condition = Condition::any().add(Column::ExternalId.eq(key));
        if let Ok(id) = Uuid::parse_str(key) {
            condition = condition.add(Column::Id.eq(id));
        }
        Entity::find()
            .filter(Column::OrganizationId.eq(organization_id))
            .filter(condition)
            .order_by_desc(Column::UpdatedAt)
            .one(&self.db)
            .await
    }

    /// A page of products, newest first, with the total count.
    pub async fn list(
        &self,
        organization_id: Uuid,
        status: Option<ProductStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Model>, u64), DbErr> {
        let mut query = Entity::find().filter(Column::OrganizationId.eq(organization_id));
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        let paginator = query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .paginate(&self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn find_by_connector(&self, connector_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ConnectorId.eq(connector_id))
            .all(&self.db)
            .await
    }

    /// Products whose variants mention `inventory_item_id`. The text match narrows the scan;
    /// callers still compare the parsed variant field.
    pub async fn find_by_inventory_item(
        &self,
        connector_id: Uuid,
        inventory_item_id: &str,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ConnectorId.eq(connector_id))
            .filter(Expr::cust_with_values(
                format!("CAST(variants AS TEXT) LIKE ? ESCAPE '{LIKE_ESCAPE}'"),
                [quoted_pattern(inventory_item_id)],
            ))
            .all(&self.db)
            .await
    }

    /// Soft-deletes one product. Returns false when no such product exists.
    pub async fn mark_inactive(&self, connector_id: Uuid, external_id: &str) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(ProductStatus::Inactive.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ConnectorId.eq(connector_id))
            .filter(Column::ExternalId.eq(external_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Soft-deletes every product of a connector.
    pub async fn deactivate_connector(&self, connector_id: Uuid) -> Result<u64, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(ProductStatus::Inactive.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ConnectorId.eq(connector_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Replaces the variants of a product and re-derives its stock status.
    ///
    /// Only `active` and `out_of_stock` move with stock; other statuses are left alone.
    pub async fn replace_variants(
        &self,
        product: Model,
        variants: Vec<Variant>,
    ) -> Result<Model, DbErr> {
        let status = match product.parsed_status() {
            ProductStatus::Active | ProductStatus::OutOfStock if is_sold_out(&variants) => {
                ProductStatus::OutOfStock
            }
            ProductStatus::Active | ProductStatus::OutOfStock => ProductStatus::Active,
            other => other,
        };
        let variants = serde_json::to_value(&variants).map_err(|e| DbErr::Json(e.to_string()))?;

        let mut active: ActiveModel = product.into();
        active.variants = Set(variants);
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await
    }
}

fn to_active_model(
    organization_id: Uuid,
    connector_id: Uuid,
    product: &CanonicalProduct,
) -> ActiveModel {
    let now = Utc::now().fixed_offset();
    let images = JsonValue::Array(
        product
            .images
            .iter()
            .map(|url| JsonValue::String(url.clone()))
            .collect(),
    );
    let variants = serde_json::to_value(&product.variants).unwrap_or(JsonValue::Array(Vec::new()));

    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(organization_id),
        connector_id: Set(connector_id),
        external_id: Set(product.external_id.clone()),
        title: Set(product.title.clone()),
        description: Set(product.description.clone()),
        price: Set(product.price),
        currency: Set(product.currency.clone()),
        sku: Set(product.sku.clone()),
        brand: Set(product.brand.clone()),
        category: Set(product.category.clone()),
        images: Set(images),
        variants: Set(variants),
        metadata: Set(Some(product.metadata.clone())),
        status: Set(product.status().as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
}
