use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::generation::{
    CreateGenerationExclusion, ExclusionKind, GenerationExclusion, GenerationQueueItem,
};
use serde::Deserialize;
use services::services::{
    auto_blog::{AutoBlogService, BatchProgress, ProductGenerationResult, ProductGenerationStatus},
    generation_queue,
    title_generator::TitleGeneration,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize, TS)]
pub struct StartBatchRequest {
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct EnqueueRequest {
    pub product_id: Uuid,
    pub priority: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub limit: Option<i64>,
}

/// GET /api/generation/products/{id}/status
pub async fn product_status(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ProductGenerationStatus>>, ApiError> {
    let status = AutoBlogService::product_status(&state.db.pool, product_id).await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

/// POST /api/generation/products/{id}/titles
pub async fn generate_titles(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<TitleGeneration>>, ApiError> {
    let generation = state.auto_blog()?.generate_titles(product_id).await?;
    Ok(ResponseJson(ApiResponse::success(generation)))
}

/// POST /api/generation/products/{id}/generate
/// Titles if missing, then an article for every title that has none
pub async fn generate_for_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ProductGenerationResult>>, ApiError> {
    let result = state.auto_blog()?.generate_for_product(product_id).await?;
    Ok(ResponseJson(ApiResponse::success(result)))
}

/// POST /api/generation/batch
pub async fn start_batch(
    State(state): State<AppState>,
    payload: Option<Json<StartBatchRequest>>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<BatchProgress>>), ApiError> {
    let Json(request) = payload.unwrap_or_default();
    let service = Arc::new(state.auto_blog()?);
    let progress = service
        .start_batch(state.batch_progress.clone(), request.product_ids)
        .await?;
    Ok((StatusCode::ACCEPTED, ResponseJson(ApiResponse::success(progress))))
}

/// GET /api/generation/batch/progress
pub async fn batch_progress(
    State(state): State<AppState>,
) -> ResponseJson<ApiResponse<BatchProgress>> {
    let progress = state.batch_progress.read().await.clone();
    ResponseJson(ApiResponse::success(progress))
}

/// GET /api/generation/queue
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<GenerationQueueItem>>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let items = GenerationQueueItem::find_recent(&state.db.pool, limit).await?;
    Ok(ResponseJson(ApiResponse::success(items)))
}

/// POST /api/generation/queue
pub async fn enqueue(
    State(state): State<AppState>,
    Json(payload): Json<EnqueueRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<GenerationQueueItem>>), ApiError> {
    let item = generation_queue::enqueue(
        &state.db.pool,
        payload.product_id,
        payload.priority.unwrap_or(0),
    )
    .await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(item))))
}

/// GET /api/generation/exclusions
pub async fn list_exclusions(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<GenerationExclusion>>>, ApiError> {
    let exclusions = GenerationExclusion::find_all(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(exclusions)))
}

/// POST /api/generation/exclusions
pub async fn create_exclusion(
    State(state): State<AppState>,
    Json(payload): Json<CreateGenerationExclusion>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<GenerationExclusion>>), ApiError> {
    let value = payload.value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("value is required".to_string()));
    }
    if payload.kind == ExclusionKind::Product && Uuid::parse_str(value).is_err() {
        return Err(ApiError::BadRequest(
            "product exclusions take a product id".to_string(),
        ));
    }

    let exclusion = GenerationExclusion::create(&state.db.pool, &payload).await?;
    tracing::info!(kind = %exclusion.kind, value = %exclusion.value, "Added generation exclusion");
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(exclusion))))
}

/// DELETE /api/generation/exclusions/{id}
pub async fn delete_exclusion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if GenerationExclusion::delete(&state.db.pool, id).await? == 0 {
        return Err(ApiError::NotFound(format!("Exclusion {id} not found")));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let inner = Router::new()
        .route("/products/{id}/status", get(product_status))
        .route("/products/{id}/titles", post(generate_titles))
        .route("/products/{id}/generate", post(generate_for_product))
        .route("/batch", post(start_batch))
        .route("/batch/progress", get(batch_progress))
        .route("/queue", get(list_queue).post(enqueue))
        .route("/exclusions", get(list_exclusions).post(create_exclusion))
        .route("/exclusions/{id}", delete(delete_exclusion))
        .merge(super::budget::router(state));

    Router::new().nest("/generation", inner)
}
