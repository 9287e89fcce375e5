//! Refreshes the product index from the external commerce feed.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::product::{Product, SyncStatus, UpsertProduct};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum ProductSyncError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("product feed error: {0}")]
    Source(String),
    #[error("product feed is not configured")]
    NotConfigured,
    #[error("a product sync is already running")]
    AlreadyRunning,
}

/// Where products come from
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<UpsertProduct>, ProductSyncError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedBody {
    List(Vec<UpsertProduct>),
    Wrapped { products: Vec<UpsertProduct> },
}

/// JSON feed over HTTP: either a bare array or `{"products": [...]}`
pub struct HttpProductSource {
    http: Client,
    url: String,
}

impl HttpProductSource {
    pub fn new(url: impl Into<String>) -> Result<Self, ProductSyncError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("ipshopy-blogs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProductSyncError::Source(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ProductSource for HttpProductSource {
    async fn fetch(&self) -> Result<Vec<UpsertProduct>, ProductSyncError> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProductSyncError::Source(e.to_string()))?;
        if !res.status().is_success() {
            return Err(ProductSyncError::Source(format!(
                "feed returned HTTP {}",
                res.status().as_u16()
            )));
        }
        let body = res
            .json::<FeedBody>()
            .await
            .map_err(|e| ProductSyncError::Source(e.to_string()))?;
        Ok(match body {
            FeedBody::List(products) | FeedBody::Wrapped { products } => products,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SyncReport {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Clears the running flag when the sync ends, whatever the outcome
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ProductSyncService {
    pool: SqlitePool,
    running: AtomicBool,
}

impl ProductSyncService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Upsert every feed product and mark active products missing from the feed as deleted
    pub async fn sync(&self, source: &dyn ProductSource) -> Result<SyncReport, ProductSyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProductSyncError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let started_at = Utc::now();
        let feed = source.fetch().await?;
        let mut report = SyncReport {
            fetched: feed.len(),
            inserted: 0,
            updated: 0,
            deleted: 0,
            errors: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        let mut seen: HashSet<String> = HashSet::with_capacity(feed.len());
        for mut product in feed {
            product.external_id = product.external_id.trim().to_string();
            if product.external_id.is_empty() || product.name.trim().is_empty() {
                report
                    .errors
                    .push(format!("skipped product without id or name: {:?}", product.name));
                continue;
            }
            if !seen.insert(product.external_id.clone()) {
                report
                    .errors
                    .push(format!("duplicate external id {}", product.external_id));
                continue;
            }
            match Product::upsert(&self.pool, &product).await {
                Ok((_, true)) => report.inserted += 1,
                Ok((_, false)) => report.updated += 1,
                Err(e) => {
                    warn!(external_id = %product.external_id, error = %e, "Failed to upsert product");
                    report.errors.push(format!("{}: {}", product.external_id, e));
                    // keep the row from being marked deleted below
                }
            }
        }

        if seen.is_empty() {
            warn!("Product feed was empty, leaving existing products untouched");
            report
                .errors
                .push("feed contained no valid products; nothing marked deleted".to_string());
        } else {
            let missing: Vec<_> = Product::active_external_ids(&self.pool)
                .await?
                .into_iter()
                .filter(|(_, external_id)| !seen.contains(external_id))
                .collect();

            let mut tx = self.pool.begin().await?;
            for (id, _) in &missing {
                Product::update_sync_status(&mut *tx, *id, SyncStatus::Deleted).await?;
            }
            tx.commit().await?;
            report.deleted = missing.len();
        }

        report.finished_at = Utc::now();
        info!(
            fetched = report.fetched,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            errors = report.errors.len(),
            "Product sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use db::DBService;
    use tokio::sync::Notify;

    use super::*;

    struct StaticSource(Vec<UpsertProduct>);

    #[async_trait]
    impl ProductSource for StaticSource {
        async fn fetch(&self) -> Result<Vec<UpsertProduct>, ProductSyncError> {
            Ok(self.0.clone())
        }
    }

    struct GatedSource(Notify);

    #[async_trait]
    impl ProductSource for GatedSource {
        async fn fetch(&self) -> Result<Vec<UpsertProduct>, ProductSyncError> {
            self.0.notified().await;
            Ok(vec![])
        }
    }

    fn feed_item(external_id: &str, name: &str) -> UpsertProduct {
        serde_json::from_value(serde_json::json!({
            "external_id": external_id,
            "name": name,
            "category": "Home",
            "price": 12.5,
            "tags": ["kitchen"]
        }))
        .unwrap()
    }

    #[test]
    fn test_feed_body_shapes() {
        let bare: FeedBody = serde_json::from_str(r#"[{"external_id": "1", "name": "A"}]"#).unwrap();
        let wrapped: FeedBody =
            serde_json::from_str(r#"{"products": [{"external_id": "1", "name": "A"}]}"#).unwrap();
        for body in [bare, wrapped] {
            match body {
                FeedBody::List(p) | FeedBody::Wrapped { products: p } => assert_eq!(p.len(), 1),
            }
        }
    }

    #[tokio::test]
    async fn test_sync_upserts_and_marks_missing_deleted() {
        let db = DBService::new_in_memory().await.unwrap();
        let service = ProductSyncService::new(db.pool.clone());

        let first = StaticSource(vec![feed_item("a", "Pan"), feed_item("b", "Pot")]);
        let report = service.sync(&first).await.unwrap();
        assert_eq!((report.inserted, report.updated, report.deleted), (2, 0, 0));

        let second = StaticSource(vec![
            feed_item("a", "Pan v2"),
            feed_item("c", "Lid"),
            feed_item("c", "Lid again"),
            feed_item("", "Nameless"),
        ]);
        let report = service.sync(&second).await.unwrap();
        assert_eq!((report.inserted, report.updated, report.deleted), (1, 1, 1));
        assert_eq!(report.errors.len(), 2);

        let pot = Product::find_by_external_id(&db.pool, "b").await.unwrap().unwrap();
        assert_eq!(pot.sync_status, SyncStatus::Deleted);
        assert_eq!(Product::count_active(&db.pool).await.unwrap(), 2);
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_empty_feed_deletes_nothing() {
        let db = DBService::new_in_memory().await.unwrap();
        let service = ProductSyncService::new(db.pool.clone());
        service.sync(&StaticSource(vec![feed_item("a", "Pan")])).await.unwrap();

        let report = service.sync(&StaticSource(vec![])).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(Product::count_active(&db.pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resync_keeps_admin_priority() {
        let db = DBService::new_in_memory().await.unwrap();
        let service = ProductSyncService::new(db.pool.clone());
        service.sync(&StaticSource(vec![feed_item("a", "Pan")])).await.unwrap();

        let pan = Product::find_by_external_id(&db.pool, "a").await.unwrap().unwrap();
        Product::update_admin_priority(&db.pool, pan.id, 9).await.unwrap();

        let report = service
            .sync(&StaticSource(vec![feed_item("a", "Pan v2")]))
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let pan = Product::find_by_external_id(&db.pool, "a").await.unwrap().unwrap();
        assert_eq!(pan.name, "Pan v2");
        assert_eq!(pan.admin_priority, 9);
    }

    #[tokio::test]
    async fn test_overlapping_sync_is_rejected() {
        let db = DBService::new_in_memory().await.unwrap();
        let service = Arc::new(ProductSyncService::new(db.pool.clone()));
        let gated = Arc::new(GatedSource(Notify::new()));

        let running = {
            let service = service.clone();
            let gated = gated.clone();
            tokio::spawn(async move { service.sync(gated.as_ref()).await })
        };
        while !service.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            service.sync(&StaticSource(vec![])).await,
            Err(ProductSyncError::AlreadyRunning)
        ));

        gated.0.notify_one();
        running.await.unwrap().unwrap();
        assert!(!service.is_running());
    }
}
