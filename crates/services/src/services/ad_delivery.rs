//! Ad selection: campaign targeting first, scorer recommendations as the fallback.

use chrono::{DateTime, Utc};
use db::models::{
    ad::{AdCampaign, AdItem, AdPlacement, CampaignStatus, TargetType},
    blog::Blog,
    category::Category,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use utils::text::keywords;
use uuid::Uuid;

use super::relevance::{MatchTarget, ProductSelector, RelevanceError, ScoredProduct, SelectionOptions};

pub const DEFAULT_AD_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum AdDeliveryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Relevance(#[from] RelevanceError),
    #[error("ad item not found: {0}")]
    ItemNotFound(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AdRequest {
    pub placement: AdPlacement,
    pub category_id: Option<Uuid>,
    pub blog_id: Option<Uuid>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub limit: Option<usize>,
}

/// Request data resolved against the database, used for matching
#[derive(Debug, Clone, Default)]
pub struct AdContext {
    pub placement: AdPlacement,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub blog_id: Option<Uuid>,
    pub blog_slug: Option<String>,
    /// Lowercase request keywords plus category and blog text
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum AdSource {
    Campaign,
    Recommendation,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ServedAd {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub item: AdItem,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AdServeResponse {
    pub source: AdSource,
    pub ads: Vec<ServedAd>,
    pub recommendations: Vec<ScoredProduct>,
}

/// Whether a campaign may serve into this context at `now`
pub fn campaign_matches(campaign: &AdCampaign, ctx: &AdContext, now: DateTime<Utc>) -> bool {
    if campaign.status != CampaignStatus::Active {
        return false;
    }
    if campaign.starts_at.is_some_and(|start| now < start)
        || campaign.ends_at.is_some_and(|end| now > end)
    {
        return false;
    }
    if campaign.placement != AdPlacement::All && campaign.placement != ctx.placement {
        return false;
    }

    let targets = campaign.parsed_targets();
    let contains_id = |id: Option<Uuid>| {
        id.is_some_and(|id| {
            let id = id.to_string();
            targets.iter().any(|t| t.trim().eq_ignore_ascii_case(&id))
        })
    };

    match campaign.target_type {
        TargetType::All => true,
        TargetType::Categories => contains_id(ctx.category_id),
        TargetType::Blogs => contains_id(ctx.blog_id),
        TargetType::Keywords => targets.iter().any(|t| {
            let t = t.trim().to_lowercase();
            ctx.keywords.contains(&t)
        }),
    }
}

/// Serve up to `limit` ads. Served campaign items get an impression each.
pub async fn serve(
    pool: &SqlitePool,
    request: &AdRequest,
    now: DateTime<Utc>,
) -> Result<AdServeResponse, AdDeliveryError> {
    let limit = request.limit.unwrap_or(DEFAULT_AD_LIMIT).max(1);
    let ctx = resolve_context(pool, request).await?;

    let mut candidates: Vec<(i64, ServedAd)> = Vec::new();
    for campaign in AdCampaign::find_active(pool).await? {
        if !campaign_matches(&campaign, &ctx, now) {
            continue;
        }
        for item in AdItem::find_active_by_campaign_id(pool, campaign.id).await? {
            candidates.push((
                campaign.priority,
                ServedAd {
                    campaign_id: campaign.id,
                    campaign_name: campaign.name.clone(),
                    item,
                },
            ));
        }
    }
    candidates.sort_by(|(a_priority, a), (b_priority, b)| {
        b_priority
            .cmp(a_priority)
            .then_with(|| b.item.priority.cmp(&a.item.priority))
    });
    candidates.truncate(limit);

    if !candidates.is_empty() {
        let mut ads = Vec::with_capacity(candidates.len());
        for (_, mut served) in candidates {
            if AdItem::record_impression(pool, served.item.id).await? {
                served.item.impressions += 1;
            }
            ads.push(served);
        }
        debug!(placement = %ctx.placement, served = ads.len(), "Served campaign ads");
        return Ok(AdServeResponse {
            source: AdSource::Campaign,
            ads,
            recommendations: Vec::new(),
        });
    }

    let recommendations = recommend(pool, &ctx, limit).await?;
    debug!(
        placement = %ctx.placement,
        recommended = recommendations.len(),
        "No campaign matched, using product recommendations"
    );
    Ok(AdServeResponse {
        source: if recommendations.is_empty() {
            AdSource::None
        } else {
            AdSource::Recommendation
        },
        ads: Vec::new(),
        recommendations,
    })
}

async fn recommend(
    pool: &SqlitePool,
    ctx: &AdContext,
    limit: usize,
) -> Result<Vec<ScoredProduct>, AdDeliveryError> {
    let selector = ProductSelector::new(pool.clone());
    let options = SelectionOptions {
        limit,
        ..SelectionOptions::default()
    };

    let ranked = if let Some(slug) = ctx.blog_slug.as_deref() {
        selector.select_for_blog(slug, &options).await?
    } else if let Some(category) = ctx.category_name.as_deref() {
        selector.select_for_category(category, &options).await?
    } else if !ctx.keywords.is_empty() {
        selector
            .select_for_target(&MatchTarget::from_text(None, &ctx.keywords.join(" ")), &options)
            .await?
    } else {
        Vec::new()
    };
    Ok(ranked)
}

async fn resolve_context(pool: &SqlitePool, request: &AdRequest) -> Result<AdContext, sqlx::Error> {
    let mut ctx = AdContext {
        placement: request.placement,
        category_id: request.category_id,
        blog_id: request.blog_id,
        keywords: request
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect(),
        ..AdContext::default()
    };

    if let Some(category_id) = request.category_id {
        match Category::find_by_id(pool, category_id).await? {
            Some(category) => {
                push_unique(&mut ctx.keywords, category.name.to_lowercase());
                ctx.category_name = Some(category.name);
            }
            None => warn!(category_id = %category_id, "Ad request for unknown category"),
        }
    }

    if let Some(blog_id) = request.blog_id {
        match Blog::find_by_id(pool, blog_id).await? {
            Some(blog) => {
                for keyword in blog.keyword_list() {
                    push_unique(&mut ctx.keywords, keyword.to_lowercase());
                }
                for token in keywords(&blog.title) {
                    push_unique(&mut ctx.keywords, token);
                }
                ctx.blog_slug = Some(blog.slug);
            }
            None => warn!(blog_id = %blog_id, "Ad request for unknown blog"),
        }
    }

    Ok(ctx)
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

pub async fn record_impression(pool: &SqlitePool, item_id: Uuid) -> Result<(), AdDeliveryError> {
    if AdItem::record_impression(pool, item_id).await? {
        Ok(())
    } else {
        Err(AdDeliveryError::ItemNotFound(item_id))
    }
}

pub async fn record_click(pool: &SqlitePool, item_id: Uuid) -> Result<(), AdDeliveryError> {
    if AdItem::record_click(pool, item_id).await? {
        debug!(item_id = %item_id, "Ad click recorded");
        Ok(())
    } else {
        Err(AdDeliveryError::ItemNotFound(item_id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use db::{
        DBService,
        models::{
            ad::{CreateAdCampaign, CreateAdItem},
            category::CreateCategory,
            product::{Product, UpsertProduct},
        },
    };

    use super::*;

    fn campaign(target_type: TargetType, targets: &[&str]) -> AdCampaign {
        AdCampaign {
            id: Uuid::new_v4(),
            name: "Summer".to_string(),
            status: CampaignStatus::Active,
            placement: AdPlacement::All,
            target_type,
            target_values: serde_json::to_string(targets).unwrap(),
            priority: 0,
            starts_at: None,
            ends_at: None,
            created_at: Utc::now(),
        }
    }

    fn blog_ctx() -> AdContext {
        AdContext {
            placement: AdPlacement::Blog,
            ..AdContext::default()
        }
    }

    #[test]
    fn test_schedule_status_and_placement() {
        let now = Utc::now();
        let ctx = blog_ctx();

        let mut c = campaign(TargetType::All, &[]);
        assert!(campaign_matches(&c, &ctx, now));

        c.starts_at = Some(now + Duration::hours(1));
        assert!(!campaign_matches(&c, &ctx, now));
        c.starts_at = Some(now - Duration::hours(2));
        c.ends_at = Some(now - Duration::hours(1));
        assert!(!campaign_matches(&c, &ctx, now));
        c.ends_at = None;

        c.placement = AdPlacement::Homepage;
        assert!(!campaign_matches(&c, &ctx, now));
        c.placement = AdPlacement::Blog;
        assert!(campaign_matches(&c, &ctx, now));

        c.status = CampaignStatus::Paused;
        assert!(!campaign_matches(&c, &ctx, now));
    }

    #[test]
    fn test_targeting_rules() {
        let now = Utc::now();
        let category_id = Uuid::new_v4();
        let blog_id = Uuid::new_v4();
        let ctx = AdContext {
            placement: AdPlacement::Category,
            category_id: Some(category_id),
            blog_id: Some(blog_id),
            keywords: vec!["yoga".to_string()],
            ..AdContext::default()
        };

        let by_category = campaign(TargetType::Categories, &[&category_id.to_string()]);
        assert!(campaign_matches(&by_category, &ctx, now));
        let other_category = campaign(TargetType::Categories, &[&Uuid::new_v4().to_string()]);
        assert!(!campaign_matches(&other_category, &ctx, now));

        let by_blog = campaign(TargetType::Blogs, &[&blog_id.to_string().to_uppercase()]);
        assert!(campaign_matches(&by_blog, &ctx, now));

        assert!(campaign_matches(&campaign(TargetType::Keywords, &["Yoga"]), &ctx, now));
        assert!(!campaign_matches(&campaign(TargetType::Keywords, &["golf"]), &ctx, now));
    }

    async fn seed_product(db: &DBService, ext: &str, name: &str, category: &str) -> Product {
        Product::upsert(
            &db.pool,
            &UpsertProduct {
                external_id: ext.to_string(),
                name: name.to_string(),
                category: category.to_string(),
                price: 30.0,
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

    #[tokio::test]
    async fn test_category_campaign_serves_only_for_its_category() {
        let db = DBService::new_in_memory().await.unwrap();
        let fitness = Category::create(
            &db.pool,
            &CreateCategory {
                name: "Fitness".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        let kitchen = Category::create(
            &db.pool,
            &CreateCategory {
                name: "Kitchen".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        seed_product(&db, "k1", "Chef Knife", "Kitchen").await;

        let campaign = AdCampaign::create(
            &db.pool,
            &CreateAdCampaign {
                name: "Fitness week".to_string(),
                status: None,
                placement: Some(AdPlacement::Category),
                target_type: Some(TargetType::Categories),
                target_values: vec![fitness.id.to_string()],
                priority: Some(5),
                starts_at: None,
                ends_at: None,
            },
        )
        .await
        .unwrap();
        for (title, priority) in [("Low", 1), ("High", 9)] {
            AdItem::create(
                &db.pool,
                campaign.id,
                &CreateAdItem {
                    product_id: None,
                    title: title.to_string(),
                    image_url: None,
                    link_url: "https://shop.example".to_string(),
                    priority: Some(priority),
                },
            )
            .await
            .unwrap();
        }

        let request = |category_id| AdRequest {
            placement: AdPlacement::Category,
            category_id: Some(category_id),
            blog_id: None,
            keywords: vec![],
            limit: None,
        };

        let served = serve(&db.pool, &request(fitness.id), Utc::now()).await.unwrap();
        assert_eq!(served.source, AdSource::Campaign);
        assert_eq!(served.ads[0].item.title, "High");
        assert_eq!(served.ads[0].item.impressions, 1);
        let stored = AdItem::find_by_id(&db.pool, served.ads[0].item.id).await.unwrap().unwrap();
        assert_eq!(stored.impressions, 1);

        let fallback = serve(&db.pool, &request(kitchen.id), Utc::now()).await.unwrap();
        assert_eq!(fallback.source, AdSource::Recommendation);
        assert!(fallback.ads.is_empty());
        assert_eq!(fallback.recommendations[0].product.name, "Chef Knife");
    }

    #[tokio::test]
    async fn test_click_tracking() {
        let db = DBService::new_in_memory().await.unwrap();
        let campaign = AdCampaign::create(
            &db.pool,
            &CreateAdCampaign {
                name: "Any".to_string(),
                status: None,
                placement: None,
                target_type: None,
                target_values: vec![],
                priority: None,
                starts_at: None,
                ends_at: None,
            },
        )
        .await
        .unwrap();
        let item = AdItem::create(
            &db.pool,
            campaign.id,
            &CreateAdItem {
                product_id: None,
                title: "Ad".to_string(),
                image_url: None,
                link_url: "/".to_string(),
                priority: None,
            },
        )
        .await
        .unwrap();

        record_click(&db.pool, item.id).await.unwrap();
        record_click(&db.pool, item.id).await.unwrap();
        let stored = AdItem::find_by_id(&db.pool, item.id).await.unwrap().unwrap();
        assert_eq!(stored.clicks, 2);
        assert!(matches!(
            record_click(&db.pool, Uuid::new_v4()).await,
            Err(AdDeliveryError::ItemNotFound(_))
        ));
    }
}
