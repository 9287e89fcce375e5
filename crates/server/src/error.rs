use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    ad_delivery::AdDeliveryError,
    ai_provider::AiProviderError,
    auto_blog::AutoBlogError,
    budget::BudgetError,
    generation_queue::GenerationQueueError,
    product_sync::ProductSyncError,
    relevance::RelevanceError,
    title_generator::TitleGeneratorError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    AutoBlog(#[from] AutoBlogError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    AiProvider(#[from] AiProviderError),
    #[error(transparent)]
    Relevance(#[from] RelevanceError),
    #[error(transparent)]
    AdDelivery(#[from] AdDeliveryError),
    #[error(transparent)]
    ProductSync(#[from] ProductSyncError),
    #[error(transparent)]
    GenerationQueue(#[from] GenerationQueueError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Database(e) => database_status(e),
            ApiError::AutoBlog(e) => match e {
                AutoBlogError::Database(e) => database_status(e),
                AutoBlogError::NotFound(_) => StatusCode::NOT_FOUND,
                AutoBlogError::Excluded(_) | AutoBlogError::AlreadyRunning => StatusCode::CONFLICT,
                AutoBlogError::Titles(e) => title_status(e),
            },
            ApiError::Budget(e) => budget_status(e),
            ApiError::AiProvider(e) => provider_status(e),
            ApiError::Relevance(e) => relevance_status(e),
            ApiError::AdDelivery(e) => match e {
                AdDeliveryError::Database(e) => database_status(e),
                AdDeliveryError::Relevance(e) => relevance_status(e),
                AdDeliveryError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            },
            ApiError::ProductSync(e) => match e {
                ProductSyncError::Database(e) => database_status(e),
                ProductSyncError::Source(_) => StatusCode::BAD_GATEWAY,
                ProductSyncError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                ProductSyncError::AlreadyRunning => StatusCode::CONFLICT,
            },
            ApiError::GenerationQueue(e) => match e {
                GenerationQueueError::Database(e) => database_status(e),
                GenerationQueueError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

fn database_status(e: &sqlx::Error) -> StatusCode {
    match e {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db) if db.is_unique_violation() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn budget_status(e: &BudgetError) -> StatusCode {
    match e {
        BudgetError::Database(e) => database_status(e),
        BudgetError::Exceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BudgetError::Invalid(_) => StatusCode::BAD_REQUEST,
    }
}

fn provider_status(e: &AiProviderError) -> StatusCode {
    match e {
        AiProviderError::MissingApiKey(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn relevance_status(e: &RelevanceError) -> StatusCode {
    match e {
        RelevanceError::Database(e) => database_status(e),
        RelevanceError::BlogNotFound(_) => StatusCode::NOT_FOUND,
    }
}

fn title_status(e: &TitleGeneratorError) -> StatusCode {
    match e {
        TitleGeneratorError::Database(e) => database_status(e),
        TitleGeneratorError::Provider(e) => provider_status(e),
        TitleGeneratorError::Budget(e) => budget_status(e),
        TitleGeneratorError::NoTitles => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!(status = status_code.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status_code.as_u16(), error = %self, "Request rejected");
        }

        let message = match &self {
            ApiError::Database(_) if status_code == StatusCode::INTERNAL_SERVER_ERROR => {
                "Database error".to_string()
            }
            ApiError::Unauthorized => "Unauthorized. Please provide valid credentials.".to_string(),
            _ => self.to_string(),
        };
        (status_code, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
