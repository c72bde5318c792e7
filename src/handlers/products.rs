//! # Product API Handlers
//!
//! Read access to the normalized product store.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::types::{PageQuery, PaginatedResponse};
use crate::models::product::{self, ProductStatus, Variant};
use crate::repositories::ProductRepository;
use crate::server::AppState;

/// Normalized product with its summed stock
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub connector_id: Uuid,
    /// Identifier in the source system
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    pub currency: String,
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<Variant>,
    /// Inventory summed across variants
    pub stock: i64,
    pub metadata: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        let images = model.image_list();
        let variants = model.variant_list();
        let stock = model.total_stock();
        Self {
            id: model.id,
            connector_id: model.connector_id,
            external_id: model.external_id,
            title: model.title,
            description: model.description,
            price: model.price,
            currency: model.currency,
            sku: model.sku,
            brand: model.brand,
            category: model.category,
            images,
            variants,
            stock,
            metadata: model.metadata,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Product listing query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListProductsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// `active`, `inactive`, `out_of_stock`, `archived` or `draft`
    pub status: Option<String>,
}

/// Lists products, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ListProductsQuery),
    responses(
        (status = 200, description = "Page of products", body = PaginatedResponse<ProductResponse>),
        (status = 400, description = "Invalid query", body = ApiError)
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<PaginatedResponse<ProductResponse>>, ApiError> {
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ProductStatus>)
        .transpose()
        .map_err(|message| ApiError::new(StatusCode::BAD_REQUEST, "BAD_PAYLOAD", message))?;

    let (products, total) = ProductRepository::new(state.db.clone())
        .list(state.organization_id, status, page, limit)
        .await?;
    Ok(Json(PaginatedResponse::new(
        products.into_iter().map(ProductResponse::from).collect(),
        page,
        limit,
        total,
    )))
}

/// Gets a product by UUID or by its external id
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = String, Path, description = "Product UUID or upstream external id")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Product not found", body = ApiError)
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = ProductRepository::new(state.db.clone())
        .find_by_key(state.organization_id, &key)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("product not found: {key}"),
            )
        })?;
    Ok(Json(product.into()))
}
