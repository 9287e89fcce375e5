use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::product::Product;
use serde::{Deserialize, Serialize};
use services::services::relevance::{ProductSelector, ScoredProduct, SelectionOptions};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, TS)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct RelevantProductsQuery {
    pub blog_slug: Option<String>,
    pub category: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateProductPriority {
    pub admin_priority: i64,
}

/// GET /api/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<ResponseJson<ApiResponse<ProductPage>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let products = Product::find_active(&state.db.pool, limit, offset).await?;
    let total = Product::count_active(&state.db.pool).await?;

    Ok(ResponseJson(ApiResponse::success(ProductPage {
        products,
        total,
        limit,
        offset,
    })))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    let product = Product::find_by_id(&state.db.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;
    Ok(ResponseJson(ApiResponse::success(product)))
}

/// PUT /api/products/{id}/priority
/// Manual promotion weight used by the relevance scorer, clamped to 0..10
pub async fn update_priority(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductPriority>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    if Product::find_by_id(&state.db.pool, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Product {id} not found")));
    }
    Product::update_admin_priority(&state.db.pool, id, payload.admin_priority).await?;
    let product = Product::find_by_id(&state.db.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    tracing::info!(product_id = %id, admin_priority = product.admin_priority, "Updated product priority");
    Ok(ResponseJson(ApiResponse::success(product)))
}

/// GET /api/products/relevant
/// Rank active products against a blog (by slug) or a category name
pub async fn relevant_products(
    State(state): State<AppState>,
    Query(query): Query<RelevantProductsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ScoredProduct>>>, ApiError> {
    let defaults = SelectionOptions::default();
    let options = SelectionOptions {
        limit: query.limit.unwrap_or(defaults.limit).clamp(1, 50),
        min_score: query.min_score.unwrap_or(defaults.min_score),
        exclude: Vec::new(),
    };
    let selector = ProductSelector::new(state.db.pool.clone());

    let blog_slug = query.blog_slug.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let category = query.category.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let ranked = match (blog_slug, category) {
        (Some(slug), _) => selector.select_for_blog(slug, &options).await?,
        (None, Some(category)) => selector.select_for_category(category, &options).await?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Either blog_slug or category is required".to_string(),
            ));
        }
    };

    Ok(ResponseJson(ApiResponse::success(ranked)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/relevant", get(relevant_products))
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/priority", put(update_priority))
}
