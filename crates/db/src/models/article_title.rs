use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A candidate article heading generated for a product
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ArticleTitle {
    pub id: Uuid,
    pub product_id: Uuid,
    pub article_number: i64, // 1..N within the product
    pub title: String,
    pub seo_score: i64,
    pub created_at: DateTime<Utc>,
}

/// Title plus whether an article was already written for it
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ArticleTitleWithBlog {
    pub id: Uuid,
    pub product_id: Uuid,
    pub article_number: i64,
    pub title: String,
    pub seo_score: i64,
    pub created_at: DateTime<Utc>,
    pub blog_id: Option<Uuid>,
}

impl ArticleTitle {
    pub async fn create(
        pool: &SqlitePool,
        product_id: Uuid,
        article_number: i64,
        title: &str,
        seo_score: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ArticleTitle>(
            "INSERT INTO article_titles (id, product_id, article_number, title, seo_score)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, product_id, article_number, title, seo_score, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(article_number)
        .bind(title)
        .bind(seo_score)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_product_id(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Vec<ArticleTitleWithBlog>, sqlx::Error> {
        sqlx::query_as::<_, ArticleTitleWithBlog>(
            "SELECT t.id, t.product_id, t.article_number, t.title, t.seo_score, t.created_at,
                    b.id AS blog_id
             FROM article_titles t
             LEFT JOIN blogs b ON b.article_title_id = t.id
             WHERE t.product_id = $1
             ORDER BY t.article_number ASC",
        )
        .bind(product_id)
        .fetch_all(pool)
        .await
    }
}

impl ArticleTitleWithBlog {
    pub fn has_article(&self) -> bool {
        self.blog_id.is_some()
    }

    pub fn into_title(self) -> ArticleTitle {
        ArticleTitle {
            id: self.id,
            product_id: self.product_id,
            article_number: self.article_number,
            title: self.title,
            seo_score: self.seo_score,
            created_at: self.created_at,
        }
    }
}
