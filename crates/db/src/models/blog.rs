use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

const BLOG_COLUMNS: &str = "id, title, slug, content, excerpt, category_id, keywords, status, source, \
     product_id, article_title_id, created_at, updated_at";

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "blog_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlogStatus {
    #[default]
    Draft,
    Published,
}

/// Source of blog creation
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "blog_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlogSource {
    #[default]
    Manual,
    AiGenerated,
}

/// Where a linked product is shown inside an article
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "placement", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkPlacement {
    #[default]
    Inline,
    Featured,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub category_id: Option<Uuid>,
    pub keywords: Option<String>, // comma separated
    pub status: BlogStatus,
    pub source: BlogSource,
    pub product_id: Option<Uuid>,       // product the article was generated for
    pub article_title_id: Option<Uuid>, // title it was generated from
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateBlog {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub category_id: Option<Uuid>,
    pub keywords: Option<String>,
    pub status: Option<BlogStatus>,
    pub source: Option<BlogSource>,
    pub product_id: Option<Uuid>,
    pub article_title_id: Option<Uuid>,
}

impl CreateBlog {
    pub fn manual(title: impl Into<String>, slug: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            content: content.into(),
            excerpt: None,
            category_id: None,
            keywords: None,
            status: Some(BlogStatus::Draft),
            source: Some(BlogSource::Manual),
            product_id: None,
            article_title_id: None,
        }
    }
}

/// A product hyperlinked from a blog, joined with the product row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct BlogProductLink {
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub anchor_text: String,
    pub placement: LinkPlacement,
}

impl Blog {
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .as_deref()
            .map(utils::text::split_list)
            .unwrap_or_default()
    }

    pub async fn create<'e, E>(executor: E, id: Uuid, data: &CreateBlog) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "INSERT INTO blogs (id, title, slug, content, excerpt, category_id, keywords, status, source,
                                product_id, article_title_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {BLOG_COLUMNS}"
        );
        sqlx::query_as::<_, Blog>(&sql)
            .bind(id)
            .bind(&data.title)
            .bind(&data.slug)
            .bind(&data.content)
            .bind(&data.excerpt)
            .bind(data.category_id)
            .bind(&data.keywords)
            .bind(data.status.unwrap_or_default())
            .bind(data.source.unwrap_or_default())
            .bind(data.product_id)
            .bind(data.article_title_id)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = $1");
        sqlx::query_as::<_, Blog>(&sql).bind(id).fetch_optional(pool).await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE slug = $1");
        sqlx::query_as::<_, Blog>(&sql)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_article_title_id(
        pool: &SqlitePool,
        article_title_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE article_title_id = $1");
        sqlx::query_as::<_, Blog>(&sql)
            .bind(article_title_id)
            .fetch_optional(pool)
            .await
    }

    /// Number of generated articles for a product that are tied to one of its titles
    pub async fn count_generated_for_product(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM blogs b
             JOIN article_titles t ON t.id = b.article_title_id
             WHERE t.product_id = $1",
        )
        .bind(product_id)
        .fetch_one(pool)
        .await
    }

    /// True when some blog other than `exclude_id` already uses `slug`
    pub async fn slug_exists(
        pool: &SqlitePool,
        slug: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = match exclude_id {
            Some(exclude_id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM blogs WHERE slug = $1 AND id != $2")
                    .bind(slug)
                    .bind(exclude_id)
                    .fetch_one(pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM blogs WHERE slug = $1")
                    .bind(slug)
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(count > 0)
    }

    /// Existing slugs equal to `base` or of the form `base-*`
    pub async fn slugs_like(pool: &SqlitePool, base: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT slug FROM blogs WHERE slug = $1 OR slug LIKE $1 || '-%'")
            .bind(base)
            .fetch_all(pool)
            .await
    }
}

pub struct BlogProduct;

impl BlogProduct {
    /// Record a product hyperlink; linking the same product twice is a no-op.
    pub async fn link<'e, E>(
        executor: E,
        blog_id: Uuid,
        product_id: Uuid,
        anchor_text: &str,
        placement: LinkPlacement,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO blog_products (blog_id, product_id, anchor_text, placement)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT(blog_id, product_id) DO NOTHING",
        )
        .bind(blog_id)
        .bind(product_id)
        .bind(anchor_text)
        .bind(placement)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Active linked products, featured placement first
    pub async fn find_by_blog_id(
        pool: &SqlitePool,
        blog_id: Uuid,
    ) -> Result<Vec<BlogProductLink>, sqlx::Error> {
        sqlx::query_as::<_, BlogProductLink>(
            "SELECT p.id AS product_id, p.name, p.price, p.sale_price, p.url, p.image_url,
                    bp.anchor_text, bp.placement
             FROM blog_products bp
             JOIN products p ON p.id = bp.product_id
             WHERE bp.blog_id = $1 AND p.sync_status = 'active'
             ORDER BY CASE bp.placement WHEN 'featured' THEN 0 ELSE 1 END, bp.created_at ASC",
        )
        .bind(blog_id)
        .fetch_all(pool)
        .await
    }
}
