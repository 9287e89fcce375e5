use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

const PRODUCT_COLUMNS: &str = "id, external_id, name, category, price, sale_price, tags, description, \
     popularity_score, admin_priority, sync_status, url, image_url, last_synced_at, created_at, updated_at";

/// Whether the product is still present in the commerce feed
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Active,
    Deleted,
}

/// Row of the denormalized product index
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Product {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub tags: String, // comma separated
    pub description: Option<String>,
    pub popularity_score: f64, // 0..100
    pub admin_priority: i64,   // 0..10
    pub sync_status: SyncStatus,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product fields as delivered by the commerce feed
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpsertProduct {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub popularity_score: f64,
    #[serde(default)]
    pub admin_priority: i64,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

impl Product {
    pub fn tag_list(&self) -> Vec<String> {
        utils::text::split_list(&self.tags)
    }

    pub fn is_active(&self) -> bool {
        self.sync_status == SyncStatus::Active
    }

    /// Price shown to readers: the sale price when it undercuts the list price.
    pub fn effective_price(&self) -> f64 {
        match self.sale_price {
            Some(sale) if sale > 0.0 && sale < self.price => sale,
            _ => self.price,
        }
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE external_id = $1");
        sqlx::query_as::<_, Product>(&sql)
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    /// Active products, most promoted first
    pub async fn find_active(
        pool: &SqlitePool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE sync_status = 'active'
             ORDER BY admin_priority DESC, popularity_score DESC, name ASC
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_active(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE sync_status = 'active'")
            .fetch_one(pool)
            .await
    }

    /// Active products that do not yet have one article per generated title
    /// (or have no titles at all).
    pub async fn find_active_needing_generation(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p
             WHERE p.sync_status = 'active'
               AND (
                 NOT EXISTS (SELECT 1 FROM article_titles t WHERE t.product_id = p.id)
                 OR EXISTS (
                   SELECT 1 FROM article_titles t
                   WHERE t.product_id = p.id
                     AND NOT EXISTS (SELECT 1 FROM blogs b WHERE b.article_title_id = t.id)
                 )
               )
             ORDER BY p.admin_priority DESC, p.popularity_score DESC
             LIMIT $1"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Insert or refresh a product by external id, marking it active again.
    /// Admin priority is only taken from the feed on insert. Returns the row
    /// and whether it was newly inserted.
    pub async fn upsert<'e, E>(executor: E, data: &UpsertProduct) -> Result<(Self, bool), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO products (id, external_id, name, category, price, sale_price, tags, description,
                                   popularity_score, admin_priority, url, image_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT(external_id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                price = excluded.price,
                sale_price = excluded.sale_price,
                tags = excluded.tags,
                description = excluded.description,
                popularity_score = excluded.popularity_score,
                url = excluded.url,
                image_url = excluded.image_url,
                sync_status = 'active',
                last_synced_at = datetime('now', 'subsec'),
                updated_at = datetime('now', 'subsec')
             RETURNING {PRODUCT_COLUMNS}"
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(&data.external_id)
            .bind(&data.name)
            .bind(&data.category)
            .bind(data.price)
            .bind(data.sale_price)
            .bind(data.tags.join(","))
            .bind(&data.description)
            .bind(data.popularity_score.clamp(0.0, 100.0))
            .bind(data.admin_priority.clamp(0, 10))
            .bind(&data.url)
            .bind(&data.image_url)
            .fetch_one(executor)
            .await?;

        let inserted = product.id == id;
        Ok((product, inserted))
    }

    /// (id, external_id) of every active product
    pub async fn active_external_ids(pool: &SqlitePool) -> Result<Vec<(Uuid, String)>, sqlx::Error> {
        sqlx::query_as("SELECT id, external_id FROM products WHERE sync_status = 'active'")
            .fetch_all(pool)
            .await
    }

    pub async fn update_sync_status<'e, E>(
        executor: E,
        id: Uuid,
        status: SyncStatus,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE products SET sync_status = $2, updated_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn update_admin_priority(
        pool: &SqlitePool,
        id: Uuid,
        priority: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE products SET admin_priority = $2, updated_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .bind(priority.clamp(0, 10))
        .execute(pool)
        .await?;
        Ok(())
    }
}
