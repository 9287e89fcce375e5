use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

const CAMPAIGN_COLUMNS: &str =
    "id, name, status, placement, target_type, target_values, priority, starts_at, ends_at, created_at";
const ITEM_COLUMNS: &str = "id, campaign_id, product_id, title, image_url, link_url, priority, is_active, \
     impressions, clicks, created_at";

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "campaign_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Active,
    Paused,
    Ended,
}

/// Page area an ad is rendered in
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "ad_placement", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdPlacement {
    Homepage,
    Blog,
    Category,
    #[default]
    All,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "target_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetType {
    #[default]
    All,
    Categories,
    Blogs,
    Keywords,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AdCampaign {
    pub id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub placement: AdPlacement,
    pub target_type: TargetType,
    pub target_values: String, // JSON-serialized Vec<String>
    pub priority: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateAdCampaign {
    pub name: String,
    pub status: Option<CampaignStatus>,
    pub placement: Option<AdPlacement>,
    pub target_type: Option<TargetType>,
    #[serde(default)]
    pub target_values: Vec<String>,
    pub priority: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AdItem {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub product_id: Option<Uuid>,
    pub title: String,
    pub image_url: Option<String>,
    pub link_url: String,
    pub priority: i64,
    pub is_active: bool,
    pub impressions: i64,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateAdItem {
    pub product_id: Option<Uuid>,
    pub title: String,
    pub image_url: Option<String>,
    pub link_url: String,
    pub priority: Option<i64>,
}

impl AdCampaign {
    /// Parse the target_values JSON; malformed data reads as an empty list
    pub fn parsed_targets(&self) -> Vec<String> {
        serde_json::from_str(&self.target_values).unwrap_or_default()
    }

    pub async fn create(pool: &SqlitePool, data: &CreateAdCampaign) -> Result<Self, sqlx::Error> {
        let targets = serde_json::to_string(&data.target_values)
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let sql = format!(
            "INSERT INTO ad_campaigns (id, name, status, placement, target_type, target_values, priority,
                                       starts_at, ends_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {CAMPAIGN_COLUMNS}"
        );
        sqlx::query_as::<_, AdCampaign>(&sql)
            .bind(Uuid::new_v4())
            .bind(&data.name)
            .bind(data.status.unwrap_or_default())
            .bind(data.placement.unwrap_or_default())
            .bind(data.target_type.unwrap_or_default())
            .bind(targets)
            .bind(data.priority.unwrap_or(0))
            .bind(data.starts_at)
            .bind(data.ends_at)
            .fetch_one(pool)
            .await
    }

    /// Campaigns in `active` status; date windows are checked by the caller
    pub async fn find_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM ad_campaigns
             WHERE status = 'active'
             ORDER BY priority DESC, created_at ASC"
        );
        sqlx::query_as::<_, AdCampaign>(&sql).fetch_all(pool).await
    }
}

impl AdItem {
    pub async fn create(
        pool: &SqlitePool,
        campaign_id: Uuid,
        data: &CreateAdItem,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO ad_items (id, campaign_id, product_id, title, image_url, link_url, priority)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {ITEM_COLUMNS}"
        );
        sqlx::query_as::<_, AdItem>(&sql)
            .bind(Uuid::new_v4())
            .bind(campaign_id)
            .bind(data.product_id)
            .bind(&data.title)
            .bind(&data.image_url)
            .bind(&data.link_url)
            .bind(data.priority.unwrap_or(0))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM ad_items WHERE id = $1");
        sqlx::query_as::<_, AdItem>(&sql).bind(id).fetch_optional(pool).await
    }

    pub async fn find_active_by_campaign_id(
        pool: &SqlitePool,
        campaign_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM ad_items
             WHERE campaign_id = $1 AND is_active = 1
             ORDER BY priority DESC, created_at ASC"
        );
        sqlx::query_as::<_, AdItem>(&sql)
            .bind(campaign_id)
            .fetch_all(pool)
            .await
    }

    /// Returns false when the item does not exist
    pub async fn record_impression(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE ad_items SET impressions = impressions + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when the item does not exist
    pub async fn record_click(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE ad_items SET clicks = clicks + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
