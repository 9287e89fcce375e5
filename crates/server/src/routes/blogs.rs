use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::blog::{Blog, BlogProduct, BlogProductLink};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CheckSlugQuery {
    pub slug: Option<String>,
    pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SlugCheck {
    pub slug: String,
    pub is_unique: bool,
}

/// GET /api/blogs/check-slug
pub async fn check_slug(
    State(state): State<AppState>,
    Query(query): Query<CheckSlugQuery>,
) -> Result<ResponseJson<ApiResponse<SlugCheck>>, ApiError> {
    let slug = query
        .slug
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("slug is required".to_string()))?;

    let exists = Blog::slug_exists(&state.db.pool, &slug, query.exclude_id).await?;
    Ok(ResponseJson(ApiResponse::success(SlugCheck {
        slug,
        is_unique: !exists,
    })))
}

/// GET /api/blogs/{slug}/products
pub async fn blog_products(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ResponseJson<ApiResponse<Vec<BlogProductLink>>>, ApiError> {
    let blog = Blog::find_by_slug(&state.db.pool, &slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Blog '{slug}' not found")))?;
    let links = BlogProduct::find_by_blog_id(&state.db.pool, blog.id).await?;
    Ok(ResponseJson(ApiResponse::success(links)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/blogs/check-slug", get(check_slug))
        .route("/blogs/{slug}/products", get(blog_products))
}
