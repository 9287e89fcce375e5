//! Orchestrates title and article generation per product, singly or in batches.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::models::{
    article_title::{ArticleTitle, ArticleTitleWithBlog},
    generation::GenerationExclusion,
    product::Product,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ai_provider::AiProvider,
    blog_generator::{BlogGenerator, BlogGeneratorError},
    budget::BudgetError,
    config::GenerationConfig,
    title_generator::{ArticleTitleGenerator, TitleGeneration, TitleGeneratorError},
};

#[derive(Debug, Error)]
pub enum AutoBlogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("product not found: {0}")]
    NotFound(Uuid),
    #[error("product {0} is excluded from generation")]
    Excluded(Uuid),
    #[error(transparent)]
    Titles(#[from] TitleGeneratorError),
    #[error("a batch generation is already running")]
    AlreadyRunning,
}

/// Where a product is in the title → article pipeline. Derived from counts, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductGenerationState {
    NotStarted,
    TitlesGenerated,
    ArticlesInProgress,
    Complete,
}

impl ProductGenerationState {
    pub fn from_counts(titles: i64, articles: i64) -> Self {
        match (titles, articles) {
            (0, _) => Self::NotStarted,
            (_, 0) => Self::TitlesGenerated,
            (t, a) if a < t => Self::ArticlesInProgress,
            _ => Self::Complete,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProductGenerationStatus {
    pub product_id: Uuid,
    pub state: ProductGenerationState,
    pub title_count: i64,
    pub article_count: i64,
    pub titles: Vec<ArticleTitleWithBlog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenerationOutcome {
    Completed,
    Partial,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProductGenerationResult {
    pub product_id: Uuid,
    pub status: GenerationOutcome,
    pub titles_generated: usize,
    pub articles_generated: usize,
    pub blog_ids: Vec<Uuid>,
    pub errors: Vec<String>,
    pub skip_reason: Option<String>,
    pub cost: f64,
}

impl ProductGenerationResult {
    fn new(product_id: Uuid) -> Self {
        Self {
            product_id,
            status: GenerationOutcome::Completed,
            titles_generated: 0,
            articles_generated: 0,
            blog_ids: Vec::new(),
            errors: Vec::new(),
            skip_reason: None,
            cost: 0.0,
        }
    }
}

/// Progress of the detached batch run, polled through the API
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct BatchProgress {
    pub running: bool,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub current_product_id: Option<Uuid>,
    pub articles_generated: usize,
    pub total_cost: f64,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub type SharedBatchProgress = Arc<RwLock<BatchProgress>>;

pub struct AutoBlogService {
    pool: SqlitePool,
    provider: Arc<dyn AiProvider>,
    config: GenerationConfig,
}

impl AutoBlogService {
    pub fn new(pool: SqlitePool, provider: Arc<dyn AiProvider>, config: GenerationConfig) -> Self {
        Self {
            pool,
            provider,
            config,
        }
    }

    /// Titles, counts and derived state for a product
    pub async fn product_status(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<ProductGenerationStatus, AutoBlogError> {
        Product::find_by_id(pool, product_id)
            .await?
            .ok_or(AutoBlogError::NotFound(product_id))?;

        let titles = ArticleTitle::find_by_product_id(pool, product_id).await?;
        let title_count = titles.len() as i64;
        let article_count = titles.iter().filter(|t| t.has_article()).count() as i64;

        Ok(ProductGenerationStatus {
            product_id,
            state: ProductGenerationState::from_counts(title_count, article_count),
            title_count,
            article_count,
            titles,
        })
    }

    async fn active_product(&self, product_id: Uuid) -> Result<Product, AutoBlogError> {
        Product::find_by_id(&self.pool, product_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(AutoBlogError::NotFound(product_id))
    }

    pub async fn generate_titles(&self, product_id: Uuid) -> Result<TitleGeneration, AutoBlogError> {
        let product = self.active_product(product_id).await?;
        if GenerationExclusion::find_matching(&self.pool, product.id, &product.category)
            .await?
            .is_some()
        {
            return Err(AutoBlogError::Excluded(product.id));
        }

        Ok(ArticleTitleGenerator::new(self.pool.clone(), self.provider.clone())
            .generate(&product, self.config.titles_per_product)
            .await?)
    }

    /// Titles if missing, then one article per title without one. Article failures are
    /// collected and the remaining titles are still attempted.
    pub async fn generate_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<ProductGenerationResult, AutoBlogError> {
        let product = self.active_product(product_id).await?;
        let mut result = ProductGenerationResult::new(product.id);

        if let Some(exclusion) =
            GenerationExclusion::find_matching(&self.pool, product.id, &product.category).await?
        {
            info!(
                product_id = %product.id,
                kind = %exclusion.kind,
                "Product excluded from generation, skipping"
            );
            result.status = GenerationOutcome::Skipped;
            result.skip_reason = Some(
                exclusion
                    .reason
                    .unwrap_or_else(|| format!("{} exclusion: {}", exclusion.kind, exclusion.value)),
            );
            return Ok(result);
        }

        let titles = ArticleTitleGenerator::new(self.pool.clone(), self.provider.clone())
            .generate(&product, self.config.titles_per_product)
            .await?;
        if titles.created {
            result.titles_generated = titles.titles.len();
        }
        result.cost += titles.cost;

        let written = ArticleTitle::find_by_product_id(&self.pool, product.id).await?;
        let pending: Vec<ArticleTitle> = written
            .into_iter()
            .filter(|t| !t.has_article())
            .map(|t| t.into_title())
            .collect();

        let generator = BlogGenerator::new(
            self.pool.clone(),
            self.provider.clone(),
            self.config.related_products,
        );
        for title in &pending {
            match generator.generate(&product, title).await {
                Ok(article) => {
                    result.articles_generated += 1;
                    result.blog_ids.push(article.blog.id);
                    result.cost += article.cost;
                }
                Err(BlogGeneratorError::AlreadyWritten(_)) => {}
                Err(e) => {
                    warn!(
                        product_id = %product.id,
                        article_number = title.article_number,
                        error = %e,
                        "Article generation failed"
                    );
                    let budget_exhausted =
                        matches!(e, BlogGeneratorError::Budget(BudgetError::Exceeded { .. }));
                    result
                        .errors
                        .push(format!("article {}: {}", title.article_number, e));
                    if budget_exhausted {
                        break;
                    }
                }
            }
        }

        result.status = match (result.articles_generated, result.errors.len()) {
            (_, 0) => GenerationOutcome::Completed,
            (0, _) => GenerationOutcome::Failed,
            _ => GenerationOutcome::Partial,
        };

        info!(
            product_id = %product.id,
            status = %result.status,
            titles = result.titles_generated,
            articles = result.articles_generated,
            errors = result.errors.len(),
            cost = result.cost,
            "Generation for product finished"
        );
        Ok(result)
    }

    /// Start a detached batch over `product_ids`, or over the active products still
    /// missing articles when none are given. Rejected while another batch runs.
    pub async fn start_batch(
        self: Arc<Self>,
        progress: SharedBatchProgress,
        product_ids: Vec<Uuid>,
    ) -> Result<BatchProgress, AutoBlogError> {
        if progress.read().await.running {
            return Err(AutoBlogError::AlreadyRunning);
        }

        let ids = if product_ids.is_empty() {
            Product::find_active_needing_generation(&self.pool, self.config.batch_limit)
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect()
        } else {
            product_ids
        };

        let snapshot = {
            let mut guard = progress.write().await;
            if guard.running {
                return Err(AutoBlogError::AlreadyRunning);
            }
            *guard = BatchProgress {
                running: true,
                total: ids.len(),
                started_at: Some(Utc::now()),
                ..BatchProgress::default()
            };
            guard.clone()
        };

        info!(total = ids.len(), "Starting batch generation");
        tokio::spawn(async move {
            self.run_batch(progress, ids).await;
        });
        Ok(snapshot)
    }

    async fn run_batch(&self, progress: SharedBatchProgress, ids: Vec<Uuid>) {
        for product_id in ids {
            progress.write().await.current_product_id = Some(product_id);

            let outcome = self.generate_for_product(product_id).await;

            let mut guard = progress.write().await;
            guard.processed += 1;
            match outcome {
                Ok(result) => {
                    match result.status {
                        GenerationOutcome::Completed | GenerationOutcome::Partial => {
                            guard.succeeded += 1
                        }
                        GenerationOutcome::Skipped => guard.skipped += 1,
                        GenerationOutcome::Failed => guard.failed += 1,
                    }
                    guard.articles_generated += result.articles_generated;
                    guard.total_cost += result.cost;
                    guard
                        .errors
                        .extend(result.errors.into_iter().map(|e| format!("{product_id}: {e}")));
                }
                Err(e) => {
                    error!(product_id = %product_id, error = %e, "Batch generation failed for product");
                    guard.failed += 1;
                    guard.errors.push(format!("{product_id}: {e}"));
                }
            }
        }

        let mut guard = progress.write().await;
        guard.running = false;
        guard.current_product_id = None;
        guard.finished_at = Some(Utc::now());
        info!(
            processed = guard.processed,
            succeeded = guard.succeeded,
            skipped = guard.skipped,
            failed = guard.failed,
            cost = guard.total_cost,
            "Batch generation finished"
        );
    }
}
