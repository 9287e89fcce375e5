use axum::{
    Json, Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::generation::{GenerationCost, UpdateGenerationBudget};
use serde::Deserialize;
use services::services::budget::{BudgetService, BudgetStatus};
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CostsQuery {
    pub days: Option<u32>,
}

/// GET /api/generation/budget
pub async fn get_budget(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<BudgetStatus>>, ApiError> {
    let status = BudgetService::status(&state.db.pool, BudgetService::today()).await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

/// PUT /api/generation/budget
pub async fn update_budget(
    State(state): State<AppState>,
    Json(payload): Json<UpdateGenerationBudget>,
) -> Result<ResponseJson<ApiResponse<BudgetStatus>>, ApiError> {
    let budget = BudgetService::update(&state.db.pool, &payload).await?;
    tracing::info!(
        daily_budget = budget.daily_budget,
        monthly_budget = budget.monthly_budget,
        enforce = budget.enforce,
        "Updated generation budget"
    );
    let status = BudgetService::status(&state.db.pool, BudgetService::today()).await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

/// GET /api/generation/costs
pub async fn list_costs(
    State(state): State<AppState>,
    Query(query): Query<CostsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<GenerationCost>>>, ApiError> {
    let days = query.days.unwrap_or(30).clamp(1, 365);
    let costs = BudgetService::recent_costs(&state.db.pool, BudgetService::today(), days).await?;
    Ok(ResponseJson(ApiResponse::success(costs)))
}

/// Mounted under /generation
pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/budget", get(get_budget).put(update_budget))
        .route("/costs", get(list_costs))
}
