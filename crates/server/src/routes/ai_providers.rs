use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Serialize;
use services::services::{
    ai_provider::{AiProviderKind, ConnectionTest},
    budget::BudgetService,
};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Serialize, TS)]
pub struct AiProviderInfo {
    pub provider: AiProviderKind,
    pub model: Option<String>,
    pub configured: bool,
    pub base_url: Option<String>,
    pub max_retries: usize,
    pub available: Vec<AiProviderKind>,
}

/// GET /api/ai-providers
pub async fn provider_info(State(state): State<AppState>) -> ResponseJson<ApiResponse<AiProviderInfo>> {
    let ai = &state.config.ai;
    let provider = state.ai_provider().ok();

    ResponseJson(ApiResponse::success(AiProviderInfo {
        provider: provider.as_ref().map(|p| p.kind()).unwrap_or(ai.provider),
        model: provider.as_ref().map(|p| p.model().to_string()),
        configured: provider.is_some(),
        base_url: ai.base_url.clone(),
        max_retries: ai.max_retries,
        available: AiProviderKind::ALL.to_vec(),
    }))
}

/// POST /api/ai-providers/test
/// Minimal round trip to the configured provider, billed like any other call
pub async fn test_provider(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<ConnectionTest>>, ApiError> {
    let provider = state.ai_provider()?;
    let today = BudgetService::today();
    BudgetService::check(&state.db.pool, today).await?;

    let result = provider.test_connection().await;
    if let Some(usage) = result.usage {
        BudgetService::record_usage(&state.db.pool, today, &result.model, usage).await?;
    }
    if result.ok {
        tracing::info!(provider = %result.provider, latency_ms = result.latency_ms, "AI provider reachable");
    } else {
        tracing::warn!(provider = %result.provider, error = ?result.error, "AI provider test failed");
    }
    Ok(ResponseJson(ApiResponse::success(result)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/ai-providers", get(provider_info))
        .route("/ai-providers/test", post(test_provider))
}
