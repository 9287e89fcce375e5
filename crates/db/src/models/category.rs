use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateCategory {
    pub name: String,
    pub description: Option<String>,
}

impl Category {
    pub async fn create(pool: &SqlitePool, data: &CreateCategory) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, slug, description)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, slug, description, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(utils::text::slugify(&data.name))
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description, created_at FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lookup by display name or slug, case-insensitive
    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description, created_at FROM categories
             WHERE lower(name) = lower($1) OR slug = lower($1)
             LIMIT 1",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
    }
}
