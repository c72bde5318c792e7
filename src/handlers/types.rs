//! # Common API Types
//!
//! Shared response envelopes and pagination parameters used by list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use axum::http::StatusCode;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Generic paginated response wrapper for list endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    /// Items of the current page
    pub data: Vec<T>,
    /// One-based page number
    pub page: u64,
    pub limit: u64,
    /// Total number of matching items
    pub total: u64,
    /// Convenience field indicating if more pages exist
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        Self {
            data,
            page,
            limit,
            total,
            has_more: page.saturating_mul(limit) < total,
        }
    }
}

/// Page selection for list endpoints
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// One-based page number (default 1)
    pub page: Option<u64>,
    /// Page size (default 20, max 100)
    pub limit: Option<u64>,
}

impl PageQuery {
    /// Validated `(page, limit)`.
    pub fn resolve(&self) -> Result<(u64, u64), ApiError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "BAD_PAYLOAD",
                "page must be at least 1",
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "BAD_PAYLOAD",
                format!("limit must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        Ok((page, limit))
    }
}
