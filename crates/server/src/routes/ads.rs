use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::ad::AdPlacement;
use serde::Deserialize;
use services::services::ad_delivery::{self, AdRequest, AdServeResponse};
use utils::{response::ApiResponse, text::split_list};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

const MAX_ADS: usize = 20;

/// Query form of [`AdRequest`]; keywords arrive comma separated
#[derive(Debug, Deserialize)]
pub struct ServeAdsQuery {
    #[serde(default)]
    pub placement: AdPlacement,
    pub category_id: Option<Uuid>,
    pub blog_id: Option<Uuid>,
    pub keywords: Option<String>,
    pub limit: Option<usize>,
}

impl From<ServeAdsQuery> for AdRequest {
    fn from(query: ServeAdsQuery) -> Self {
        AdRequest {
            placement: query.placement,
            category_id: query.category_id,
            blog_id: query.blog_id,
            keywords: query.keywords.as_deref().map(split_list).unwrap_or_default(),
            limit: query.limit.map(|l| l.clamp(1, MAX_ADS)),
        }
    }
}

/// GET /api/ads/serve
pub async fn serve_ads(
    State(state): State<AppState>,
    Query(query): Query<ServeAdsQuery>,
) -> Result<ResponseJson<ApiResponse<AdServeResponse>>, ApiError> {
    let request = AdRequest::from(query);
    let response = ad_delivery::serve(&state.db.pool, &request, Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(response)))
}

/// POST /api/ads/items/{id}/impression
pub async fn record_impression(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    ad_delivery::record_impression(&state.db.pool, item_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/ads/items/{id}/click
pub async fn record_click(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    ad_delivery::record_click(&state.db.pool, item_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/ads/serve", get(serve_ads))
        .route("/ads/items/{id}/impression", post(record_impression))
        .route("/ads/items/{id}/click", post(record_click))
}
