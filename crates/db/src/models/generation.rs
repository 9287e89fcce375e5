//! Bookkeeping rows for AI content generation: queue, spend, budget, exclusions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "queue_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GenerationQueueItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub status: QueueStatus,
    pub priority: i64,
    pub attempts: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationQueueItem {
    /// Queue a product unless it already has a pending or processing item
    pub async fn enqueue(
        pool: &SqlitePool,
        product_id: Uuid,
        priority: i64,
    ) -> Result<Self, sqlx::Error> {
        if let Some(existing) = sqlx::query_as::<_, GenerationQueueItem>(
            "SELECT id, product_id, status, priority, attempts, error_message, created_at, updated_at
             FROM generation_queue
             WHERE product_id = $1 AND status IN ('pending', 'processing')
             LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(pool)
        .await?
        {
            return Ok(existing);
        }

        sqlx::query_as::<_, GenerationQueueItem>(
            "INSERT INTO generation_queue (id, product_id, priority)
             VALUES ($1, $2, $3)
             RETURNING id, product_id, status, priority, attempts, error_message, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(priority)
        .fetch_one(pool)
        .await
    }

    pub async fn find_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationQueueItem>(
            "SELECT id, product_id, status, priority, attempts, error_message, created_at, updated_at
             FROM generation_queue
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Move the highest priority pending item to `processing` and return it.
    /// The claim is a single conditional UPDATE so two workers cannot take the same item.
    pub async fn claim_next(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationQueueItem>(
            "UPDATE generation_queue
             SET status = 'processing',
                 attempts = attempts + 1,
                 updated_at = datetime('now', 'subsec')
             WHERE id = (
                 SELECT id FROM generation_queue
                 WHERE status = 'pending'
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
             ) AND status = 'pending'
             RETURNING id, product_id, status, priority, attempts, error_message, created_at, updated_at",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn finish(
        pool: &SqlitePool,
        id: Uuid,
        status: QueueStatus,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_queue
             SET status = $2,
                 error_message = $3,
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Put items stuck in `processing` for longer than `timeout_minutes` back to `pending`
    pub async fn reset_stale(pool: &SqlitePool, timeout_minutes: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_queue
             SET status = 'pending',
                 updated_at = datetime('now', 'subsec')
             WHERE status = 'processing'
               AND datetime(updated_at) < datetime('now', '-' || $1 || ' minutes')",
        )
        .bind(timeout_minutes)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Per-day AI spend. Totals only grow.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GenerationCost {
    pub date: NaiveDate,
    pub request_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: f64,
    pub updated_at: DateTime<Utc>,
}

impl GenerationCost {
    /// Add one provider call to the day's totals
    pub async fn record(
        pool: &SqlitePool,
        date: NaiveDate,
        input_tokens: i64,
        output_tokens: i64,
        cost: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GenerationCost>(
            "INSERT INTO generation_costs (date, request_count, input_tokens, output_tokens, total_cost)
             VALUES ($1, 1, $2, $3, $4)
             ON CONFLICT(date) DO UPDATE SET
                request_count = request_count + 1,
                input_tokens = input_tokens + excluded.input_tokens,
                output_tokens = output_tokens + excluded.output_tokens,
                total_cost = total_cost + excluded.total_cost,
                updated_at = datetime('now', 'subsec')
             RETURNING date, request_count, input_tokens, output_tokens, total_cost, updated_at",
        )
        .bind(date)
        .bind(input_tokens.max(0))
        .bind(output_tokens.max(0))
        .bind(cost.max(0.0))
        .fetch_one(pool)
        .await
    }

    pub async fn total_for_day(pool: &SqlitePool, date: NaiveDate) -> Result<f64, sqlx::Error> {
        let total: Option<f64> =
            sqlx::query_scalar("SELECT total_cost FROM generation_costs WHERE date = $1")
                .bind(date)
                .fetch_optional(pool)
                .await?;
        Ok(total.unwrap_or(0.0))
    }

    /// Sum of spend for `from..=to`
    pub async fn total_between(
        pool: &SqlitePool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64, sqlx::Error> {
        let total: Option<f64> = sqlx::query_scalar(
            "SELECT SUM(total_cost) FROM generation_costs WHERE date >= $1 AND date <= $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;
        Ok(total.unwrap_or(0.0))
    }

    pub async fn find_since(pool: &SqlitePool, from: NaiveDate) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationCost>(
            "SELECT date, request_count, input_tokens, output_tokens, total_cost, updated_at
             FROM generation_costs
             WHERE date >= $1
             ORDER BY date DESC",
        )
        .bind(from)
        .fetch_all(pool)
        .await
    }
}

/// Spend limits for AI generation (single row)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GenerationBudget {
    pub daily_budget: f64,
    pub monthly_budget: f64,
    pub enforce: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateGenerationBudget {
    pub daily_budget: Option<f64>,
    pub monthly_budget: Option<f64>,
    pub enforce: Option<bool>,
}

impl GenerationBudget {
    pub async fn get(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GenerationBudget>(
            "SELECT daily_budget, monthly_budget, enforce, updated_at FROM generation_budget WHERE id = 1",
        )
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &SqlitePool, data: &UpdateGenerationBudget) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GenerationBudget>(
            "UPDATE generation_budget
             SET daily_budget = COALESCE($1, daily_budget),
                 monthly_budget = COALESCE($2, monthly_budget),
                 enforce = COALESCE($3, enforce),
                 updated_at = datetime('now', 'subsec')
             WHERE id = 1
             RETURNING daily_budget, monthly_budget, enforce, updated_at",
        )
        .bind(data.daily_budget)
        .bind(data.monthly_budget)
        .bind(data.enforce)
        .fetch_one(pool)
        .await
    }
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "exclusion_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExclusionKind {
    Product,
    Category,
}

/// A product or category that auto-generation must skip
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GenerationExclusion {
    pub id: Uuid,
    pub kind: ExclusionKind,
    pub value: String, // product id or category name
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateGenerationExclusion {
    pub kind: ExclusionKind,
    pub value: String,
    pub reason: Option<String>,
}

impl GenerationExclusion {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateGenerationExclusion,
    ) -> Result<Self, sqlx::Error> {
        let value = match data.kind {
            ExclusionKind::Product => data.value.trim().to_string(),
            ExclusionKind::Category => data.value.trim().to_lowercase(),
        };
        sqlx::query_as::<_, GenerationExclusion>(
            "INSERT INTO generation_exclusions (id, kind, value, reason)
             VALUES ($1, $2, $3, $4)
             RETURNING id, kind, value, reason, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(data.kind)
        .bind(value)
        .bind(&data.reason)
        .fetch_one(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationExclusion>(
            "SELECT id, kind, value, reason, created_at FROM generation_exclusions ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM generation_exclusions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// The exclusion that applies to this product, if any. Category names compare case-insensitively.
    pub async fn find_matching(
        pool: &SqlitePool,
        product_id: Uuid,
        category: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationExclusion>(
            "SELECT id, kind, value, reason, created_at FROM generation_exclusions
             WHERE (kind = 'product' AND value = $1)
                OR (kind = 'category' AND value = lower(trim($2)))
             LIMIT 1",
        )
        .bind(product_id.to_string())
        .bind(category)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::product::{Product, UpsertProduct},
    };

    async fn product(db: &DBService, external_id: &str, category: &str) -> Product {
        let data = UpsertProduct {
            external_id: external_id.to_string(),
            name: format!("Product {external_id}"),
            category: category.to_string(),
            price: 10.0,
            sale_price: None,
            tags: vec![],
            description: None,
            popularity_score: 0.0,
            admin_priority: 0,
            url: None,
            image_url: None,
        };
        Product::upsert(&db.pool, &data).await.unwrap().0
    }

    #[tokio::test]
    async fn test_cost_record_accumulates_per_day() {
        let db = DBService::new_in_memory().await.unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let next = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

        GenerationCost::record(&db.pool, day, 100, 50, 0.25).await.unwrap();
        let row = GenerationCost::record(&db.pool, day, 10, 5, 0.5).await.unwrap();
        GenerationCost::record(&db.pool, next, 1, 1, 1.0).await.unwrap();

        assert_eq!(row.request_count, 2);
        assert_eq!(row.input_tokens, 110);
        assert!((GenerationCost::total_for_day(&db.pool, day).await.unwrap() - 0.75).abs() < 1e-9);
        assert!((GenerationCost::total_between(&db.pool, day, next).await.unwrap() - 1.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_budget_partial_update() {
        let db = DBService::new_in_memory().await.unwrap();
        let budget = GenerationBudget::get(&db.pool).await.unwrap();
        assert!(budget.enforce);

        let updated = GenerationBudget::update(
            &db.pool,
            &UpdateGenerationBudget {
                daily_budget: Some(2.5),
                monthly_budget: None,
                enforce: Some(false),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.daily_budget, 2.5);
        assert_eq!(updated.monthly_budget, budget.monthly_budget);
        assert!(!updated.enforce);
    }

    #[tokio::test]
    async fn test_exclusion_matches_product_or_category() {
        let db = DBService::new_in_memory().await.unwrap();
        let shoe = product(&db, "1", "Footwear").await;
        let lamp = product(&db, "2", "Lighting").await;
        let desk = product(&db, "3", "Office").await;

        GenerationExclusion::create(
            &db.pool,
            &CreateGenerationExclusion {
                kind: ExclusionKind::Product,
                value: shoe.id.to_string(),
                reason: None,
            },
        )
        .await
        .unwrap();
        GenerationExclusion::create(
            &db.pool,
            &CreateGenerationExclusion {
                kind: ExclusionKind::Category,
                value: " LIGHTING ".to_string(),
                reason: Some("seasonal".to_string()),
            },
        )
        .await
        .unwrap();

        assert!(GenerationExclusion::find_matching(&db.pool, shoe.id, &shoe.category).await.unwrap().is_some());
        assert!(GenerationExclusion::find_matching(&db.pool, lamp.id, &lamp.category).await.unwrap().is_some());
        assert!(GenerationExclusion::find_matching(&db.pool, desk.id, &desk.category).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_claim_order_and_dedupe() {
        let db = DBService::new_in_memory().await.unwrap();
        let low = product(&db, "1", "A").await;
        let high = product(&db, "2", "B").await;

        let first = GenerationQueueItem::enqueue(&db.pool, low.id, 0).await.unwrap();
        let again = GenerationQueueItem::enqueue(&db.pool, low.id, 5).await.unwrap();
        assert_eq!(first.id, again.id);
        GenerationQueueItem::enqueue(&db.pool, high.id, 10).await.unwrap();

        let claimed = GenerationQueueItem::claim_next(&db.pool).await.unwrap().unwrap();
        assert_eq!(claimed.product_id, high.id);
        assert_eq!(claimed.status, QueueStatus::Processing);
        assert_eq!(claimed.attempts, 1);

        GenerationQueueItem::finish(&db.pool, claimed.id, QueueStatus::Completed, None)
            .await
            .unwrap();
        let next = GenerationQueueItem::claim_next(&db.pool).await.unwrap().unwrap();
        assert_eq!(next.product_id, low.id);
        assert!(GenerationQueueItem::claim_next(&db.pool).await.unwrap().is_none());
    }
}
