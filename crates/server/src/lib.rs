use std::sync::Arc;

use db::DBService;
use services::services::{
    ai_provider::{AiProvider, AiProviderError, AiProviderFactory},
    auto_blog::{AutoBlogService, SharedBatchProgress},
    config::Config,
    product_sync::ProductSyncService,
};
use tracing::warn;

pub mod error;
pub mod routes;

pub use routes::router;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub config: Arc<Config>,
    pub batch_progress: SharedBatchProgress,
    pub product_sync: Arc<ProductSyncService>,
    provider: Option<Arc<dyn AiProvider>>,
}

impl AppState {
    pub fn new(db: DBService, config: Config) -> Self {
        let provider = match AiProviderFactory::from_config(&config.ai) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(error = %e, "AI provider not available, generation endpoints are disabled");
                None
            }
        };
        Self {
            product_sync: Arc::new(ProductSyncService::new(db.pool.clone())),
            db,
            config: Arc::new(config),
            batch_progress: SharedBatchProgress::default(),
            provider,
        }
    }

    /// Replace the configured provider
    pub fn with_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn ai_provider(&self) -> Result<Arc<dyn AiProvider>, AiProviderError> {
        self.provider
            .clone()
            .ok_or(AiProviderError::MissingApiKey(self.config.ai.provider.api_key_env()))
    }

    pub fn auto_blog(&self) -> Result<AutoBlogService, AiProviderError> {
        Ok(AutoBlogService::new(
            self.db.pool.clone(),
            self.ai_provider()?,
            self.config.generation.clone(),
        ))
    }
}
