//! Background worker draining the generation queue.

use std::{sync::Arc, time::Duration};

use db::models::{
    generation::{GenerationQueueItem, QueueStatus},
    product::Product,
};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    auto_blog::{AutoBlogError, AutoBlogService, GenerationOutcome},
    config::GenerationConfig,
};

#[derive(Debug, Error)]
pub enum GenerationQueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("product not found: {0}")]
    ProductNotFound(Uuid),
}

/// Queue an active product for generation. Re-queuing a product that is already
/// waiting returns the existing item.
pub async fn enqueue(
    pool: &SqlitePool,
    product_id: Uuid,
    priority: i64,
) -> Result<GenerationQueueItem, GenerationQueueError> {
    Product::find_by_id(pool, product_id)
        .await?
        .filter(|p| p.is_active())
        .ok_or(GenerationQueueError::ProductNotFound(product_id))?;
    let item = GenerationQueueItem::enqueue(pool, product_id, priority).await?;
    debug!(item_id = %item.id, product_id = %product_id, "Product queued for generation");
    Ok(item)
}

pub struct GenerationQueueWorker {
    pool: SqlitePool,
    service: Arc<AutoBlogService>,
    poll_interval: Duration,
    stale_minutes: i64,
}

impl GenerationQueueWorker {
    pub fn new(pool: SqlitePool, service: Arc<AutoBlogService>, config: &GenerationConfig) -> Self {
        Self {
            pool,
            service,
            poll_interval: config.queue_poll_interval,
            stale_minutes: config.queue_stale_minutes,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting generation queue worker with interval {:?}, stale timeout: {} min",
            self.poll_interval, self.stale_minutes
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!("Error processing generation queue: {}", e);
            }
        }
    }

    /// Recover stale items, then work through everything pending
    async fn tick(&self) -> Result<(), GenerationQueueError> {
        let reset = GenerationQueueItem::reset_stale(&self.pool, self.stale_minutes).await?;
        if reset > 0 {
            warn!(count = reset, "Reset stale generation queue items to pending");
        }

        let mut processed = 0;
        while self.process_next().await?.is_some() {
            processed += 1;
        }
        if processed > 0 {
            info!(processed, "Generation queue drained");
        } else {
            debug!("Generation queue: nothing pending");
        }
        Ok(())
    }

    /// Claim and run one pending item. Returns the status it was finished with.
    pub async fn process_next(&self) -> Result<Option<QueueStatus>, GenerationQueueError> {
        let Some(item) = GenerationQueueItem::claim_next(&self.pool).await? else {
            return Ok(None);
        };

        debug!(item_id = %item.id, product_id = %item.product_id, attempt = item.attempts, "Processing queue item");
        let (status, message) = match self.service.generate_for_product(item.product_id).await {
            Ok(result) => match result.status {
                GenerationOutcome::Completed => (QueueStatus::Completed, None),
                GenerationOutcome::Partial => {
                    (QueueStatus::Completed, Some(result.errors.join("; ")))
                }
                GenerationOutcome::Skipped => (QueueStatus::Skipped, result.skip_reason),
                GenerationOutcome::Failed => (QueueStatus::Failed, Some(result.errors.join("; "))),
            },
            Err(AutoBlogError::Excluded(_)) => (QueueStatus::Skipped, None),
            Err(e) => (QueueStatus::Failed, Some(e.to_string())),
        };

        GenerationQueueItem::finish(&self.pool, item.id, status, message.as_deref()).await?;
        info!(
            item_id = %item.id,
            product_id = %item.product_id,
            status = %status,
            "Queue item finished"
        );
        Ok(Some(status))
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            generation::{CreateGenerationExclusion, ExclusionKind, GenerationExclusion},
            product::UpsertProduct,
        },
    };

    use super::*;
    use crate::services::ai_provider::{AiProviderError, testing::ScriptedProvider};

    async fn add_product(db: &DBService, ext: &str) -> Product {
        Product::upsert(
            &db.pool,
            &UpsertProduct {
                external_id: ext.to_string(),
                name: format!("Product {ext}"),
                category: "Home".to_string(),
                price: 5.0,
                sale_price: None,
                tags: vec![],
                description: None,
                popularity_score: 0.0,
                admin_priority: 0,
                url: None,
                image_url: None,
            },
        )
        .await
        .unwrap()
        .0
    }

    fn worker(db: &DBService, responses: Vec<Result<String, AiProviderError>>) -> GenerationQueueWorker {
        let config = GenerationConfig {
            titles_per_product: 1,
            related_products: 0,
            ..GenerationConfig::default()
        };
        let service = AutoBlogService::new(
            db.pool.clone(),
            Arc::new(ScriptedProvider::new(responses)),
            config.clone(),
        );
        GenerationQueueWorker::new(db.pool.clone(), Arc::new(service), &config)
    }

    #[tokio::test]
    async fn test_enqueue_requires_active_product_and_dedupes() {
        let db = DBService::new_in_memory().await.unwrap();
        let product = add_product(&db, "p1").await;

        let first = enqueue(&db.pool, product.id, 0).await.unwrap();
        let second = enqueue(&db.pool, product.id, 5).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(matches!(
            enqueue(&db.pool, Uuid::new_v4(), 0).await,
            Err(GenerationQueueError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_process_next_marks_items() {
        let db = DBService::new_in_memory().await.unwrap();
        let generated = add_product(&db, "p1").await;
        let excluded = add_product(&db, "p2").await;
        GenerationExclusion::create(
            &db.pool,
            &CreateGenerationExclusion {
                kind: ExclusionKind::Product,
                value: excluded.id.to_string(),
                reason: None,
            },
        )
        .await
        .unwrap();
        enqueue(&db.pool, generated.id, 10).await.unwrap();
        enqueue(&db.pool, excluded.id, 0).await.unwrap();

        let worker = worker(
            &db,
            vec![
                Ok(r#"{"titles": ["A Title"]}"#.to_string()),
                Ok(r#"{"content": "Body"}"#.to_string()),
            ],
        );
        assert_eq!(worker.process_next().await.unwrap(), Some(QueueStatus::Completed));
        assert_eq!(worker.process_next().await.unwrap(), Some(QueueStatus::Skipped));
        assert_eq!(worker.process_next().await.unwrap(), None);

        let items = GenerationQueueItem::find_recent(&db.pool, 10).await.unwrap();
        assert!(items.iter().all(|i| i.attempts == 1));
    }

    #[tokio::test]
    async fn test_provider_failure_marks_item_failed() {
        let db = DBService::new_in_memory().await.unwrap();
        let product = add_product(&db, "p1").await;
        enqueue(&db.pool, product.id, 0).await.unwrap();

        let worker = worker(&db, vec![]);
        assert_eq!(worker.process_next().await.unwrap(), Some(QueueStatus::Failed));
        let items = GenerationQueueItem::find_recent(&db.pool, 10).await.unwrap();
        assert!(items[0].error_message.as_deref().unwrap_or_default().contains("script exhausted"));
    }
}
