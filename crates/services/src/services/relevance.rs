//! Heuristic product ranking for ads and in-article product placement.
//!
//! Linear scan over a bounded set of active products. Each product gets a
//! category score and a keyword-overlap score against the target text; those
//! two make up its relevance, and a product with zero relevance is never
//! returned. Admin priority and popularity are added on top so promoted
//! products win ties between equally relevant ones.

use std::cmp::Ordering;

use db::models::{blog::Blog, category::Category, product::Product};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;
use ts_rs::TS;
use utils::text::keywords;
use uuid::Uuid;

const CANDIDATE_CAP: i64 = 500;

const CATEGORY_EXACT: f64 = 40.0;
const CATEGORY_PARTIAL: f64 = 25.0;
const CATEGORY_TOKEN: f64 = 10.0;
const CATEGORY_TOKEN_CAP: f64 = 20.0;
const NAME_TOKEN: f64 = 10.0;
const NAME_SUBSTRING: f64 = 5.0;
const TAG_TOKEN: f64 = 8.0;
const DESCRIPTION_TOKEN: f64 = 2.0;
const KEYWORD_CAP: f64 = 40.0;
const PRIORITY_WEIGHT: f64 = 2.0;
const POPULARITY_WEIGHT: f64 = 0.1;

#[derive(Debug, Error)]
pub enum RelevanceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("blog not found: {0}")]
    BlogNotFound(String),
}

/// What products are matched against
#[derive(Debug, Clone, Default)]
pub struct MatchTarget {
    pub category: Option<String>,
    pub tokens: Vec<String>,
}

impl MatchTarget {
    pub fn for_category(name: &str) -> Self {
        Self {
            category: Some(name.trim().to_string()).filter(|c| !c.is_empty()),
            tokens: keywords(name),
        }
    }

    pub fn for_blog(blog: &Blog, category: Option<&Category>) -> Self {
        let mut text = blog.title.clone();
        for part in [blog.keywords.as_deref(), blog.excerpt.as_deref()].into_iter().flatten() {
            text.push(' ');
            text.push_str(part);
        }
        Self {
            category: category.map(|c| c.name.clone()),
            tokens: keywords(&text),
        }
    }

    pub fn from_text(category: Option<&str>, text: &str) -> Self {
        Self {
            category: category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            tokens: keywords(text),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, TS)]
pub struct ScoreBreakdown {
    pub category: f64,
    pub keywords: f64,
    pub priority: f64,
    pub popularity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ScoredProduct {
    pub product: Product,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone)]
pub struct SelectionOptions {
    pub limit: usize,
    pub min_score: f64,
    /// Products never returned (e.g. the article's own product)
    pub exclude: Vec<Uuid>,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            limit: 6,
            min_score: 10.0,
            exclude: Vec::new(),
        }
    }
}

/// Score one product; `None` when nothing about it relates to the target
pub fn score_product(target: &MatchTarget, product: &Product) -> Option<ScoreBreakdown> {
    let category = category_score(target, &product.category);
    let keywords = keyword_score(target, product);
    if category + keywords <= 0.0 {
        return None;
    }

    Some(ScoreBreakdown {
        category,
        keywords,
        priority: product.admin_priority.clamp(0, 10) as f64 * PRIORITY_WEIGHT,
        popularity: product.popularity_score.clamp(0.0, 100.0) * POPULARITY_WEIGHT,
    })
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.category + self.keywords + self.priority + self.popularity
    }
}

fn category_score(target: &MatchTarget, product_category: &str) -> f64 {
    let product_category = product_category.trim().to_lowercase();
    if product_category.is_empty() {
        return 0.0;
    }

    if let Some(wanted) = target.category.as_deref().map(str::to_lowercase) {
        if wanted == product_category {
            return CATEGORY_EXACT;
        }
        if product_category.contains(&wanted) || wanted.contains(&product_category) {
            return CATEGORY_PARTIAL;
        }
    }

    let category_tokens = keywords(&product_category);
    let hits = target
        .tokens
        .iter()
        .filter(|t| category_tokens.contains(t))
        .count();
    (hits as f64 * CATEGORY_TOKEN).min(CATEGORY_TOKEN_CAP)
}

fn keyword_score(target: &MatchTarget, product: &Product) -> f64 {
    if target.tokens.is_empty() {
        return 0.0;
    }

    let name_lower = product.name.to_lowercase();
    let name_tokens = keywords(&product.name);
    let tag_tokens = keywords(&product.tags);
    let description_tokens = product
        .description
        .as_deref()
        .map(keywords)
        .unwrap_or_default();

    let mut score = 0.0;
    for token in &target.tokens {
        if name_tokens.contains(token) {
            score += NAME_TOKEN;
        } else if name_lower.contains(token.as_str()) {
            score += NAME_SUBSTRING;
        }
        if tag_tokens.contains(token) {
            score += TAG_TOKEN;
        }
        if description_tokens.contains(token) {
            score += DESCRIPTION_TOKEN;
        }
    }
    score.min(KEYWORD_CAP)
}

/// Score, filter, sort descending and truncate
pub fn rank(products: Vec<Product>, target: &MatchTarget, options: &SelectionOptions) -> Vec<ScoredProduct> {
    let mut scored: Vec<ScoredProduct> = products
        .into_iter()
        .filter(|p| p.is_active() && !options.exclude.contains(&p.id))
        .filter_map(|product| {
            let breakdown = score_product(target, &product)?;
            let score = breakdown.total();
            (score >= options.min_score).then_some(ScoredProduct {
                product,
                score,
                breakdown,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| {
                b.product
                    .popularity_score
                    .partial_cmp(&a.product.popularity_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.product.name.cmp(&b.product.name))
    });
    scored.truncate(options.limit);
    scored
}

/// Database-backed entry points to the scorer
pub struct ProductSelector {
    pool: SqlitePool,
}

impl ProductSelector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn select_for_target(
        &self,
        target: &MatchTarget,
        options: &SelectionOptions,
    ) -> Result<Vec<ScoredProduct>, RelevanceError> {
        let candidates = Product::find_active(&self.pool, CANDIDATE_CAP, 0).await?;
        let candidate_count = candidates.len();
        let ranked = rank(candidates, target, options);
        debug!(
            candidates = candidate_count,
            returned = ranked.len(),
            category = ?target.category,
            "Ranked products"
        );
        Ok(ranked)
    }

    pub async fn select_for_category(
        &self,
        category: &str,
        options: &SelectionOptions,
    ) -> Result<Vec<ScoredProduct>, RelevanceError> {
        self.select_for_target(&MatchTarget::for_category(category), options)
            .await
    }

    pub async fn select_for_blog(
        &self,
        slug: &str,
        options: &SelectionOptions,
    ) -> Result<Vec<ScoredProduct>, RelevanceError> {
        let blog = Blog::find_by_slug(&self.pool, slug)
            .await?
            .ok_or_else(|| RelevanceError::BlogNotFound(slug.to_string()))?;
        let category = match blog.category_id {
            Some(id) => Category::find_by_id(&self.pool, id).await?,
            None => None,
        };
        let target = MatchTarget::for_blog(&blog, category.as_ref());
        self.select_for_target(&target, options).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::{
        DBService,
        models::{
            blog::CreateBlog,
            category::CreateCategory,
            product::{SyncStatus, UpsertProduct},
        },
    };

    use super::*;

    fn product(name: &str, category: &str, tags: &str, priority: i64, popularity: f64) -> Product {
        Product {
            id: Uuid::new_v4(),
            external_id: name.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price: 10.0,
            sale_price: None,
            tags: tags.to_string(),
            description: None,
            popularity_score: popularity,
            admin_priority: priority,
            sync_status: SyncStatus::Active,
            url: None,
            image_url: None,
            last_synced_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn catalogue() -> Vec<Product> {
        vec![
            product("Trail Running Shoes", "Footwear", "running,trail", 2, 80.0),
            product("Leather Office Shoes", "Footwear", "formal", 0, 20.0),
            product("Running Socks", "Apparel", "running", 5, 10.0),
            product("Desk Lamp", "Lighting", "office", 10, 100.0),
            product("Yoga Mat", "Fitness", "yoga", 1, 50.0),
        ]
    }

    #[test]
    fn test_results_sorted_descending_and_limited() {
        let target = MatchTarget::from_text(Some("Footwear"), "running shoes for trail runners");
        let options = SelectionOptions {
            limit: 2,
            min_score: 0.0,
            exclude: vec![],
        };
        let ranked = rank(catalogue(), &target, &options);

        assert_eq!(ranked.len(), 2);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].product.name, "Trail Running Shoes");
    }

    #[test]
    fn test_unrelated_products_never_returned_even_with_priority() {
        let target = MatchTarget::for_category("Footwear");
        let ranked = rank(catalogue(), &target, &SelectionOptions { limit: 10, min_score: 0.0, exclude: vec![] });
        assert!(ranked.iter().all(|s| s.product.category == "Footwear"));
        assert!(ranked.iter().all(|s| s.product.name != "Desk Lamp"));
    }

    #[test]
    fn test_min_score_filters() {
        let target = MatchTarget::from_text(Some("Footwear"), "running");
        let options = SelectionOptions {
            limit: 10,
            min_score: 45.0,
            exclude: vec![],
        };
        let ranked = rank(catalogue(), &target, &options);
        assert!(!ranked.is_empty());
        assert!(ranked.iter().all(|s| s.score >= 45.0));
    }

    #[test]
    fn test_deleted_and_excluded_products_skipped() {
        let mut products = catalogue();
        products[0].sync_status = SyncStatus::Deleted;
        let socks_id = products[2].id;
        let target = MatchTarget::from_text(None, "running");
        let options = SelectionOptions {
            limit: 10,
            min_score: 0.0,
            exclude: vec![socks_id],
        };
        assert!(rank(products, &target, &options).is_empty());
    }

    #[test]
    fn test_score_components() {
        let p = product("Trail Running Shoes", "Footwear", "running,trail", 3, 50.0);
        let target = MatchTarget::from_text(Some("footwear"), "trail");
        let breakdown = score_product(&target, &p).unwrap();
        assert_eq!(breakdown.category, CATEGORY_EXACT);
        assert_eq!(breakdown.keywords, NAME_TOKEN + TAG_TOKEN);
        assert_eq!(breakdown.priority, 6.0);
        assert_eq!(breakdown.popularity, 5.0);

        let partial = MatchTarget::from_text(Some("Footwear & Shoes"), "");
        assert_eq!(score_product(&partial, &p).unwrap().category, CATEGORY_PARTIAL);
    }

    #[test]
    fn test_keyword_score_is_capped() {
        let mut p = product("Running Trail Mountain Hiking Shoes", "", "running,trail,mountain,hiking", 0, 0.0);
        p.description = Some("running trail mountain hiking".to_string());
        let target = MatchTarget::from_text(None, "running trail mountain hiking");
        assert_eq!(score_product(&target, &p).unwrap().keywords, KEYWORD_CAP);
    }

    #[tokio::test]
    async fn test_select_for_blog_uses_blog_category_and_text() {
        let db = DBService::new_in_memory().await.unwrap();
        let footwear = Category::create(
            &db.pool,
            &CreateCategory {
                name: "Footwear".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        for (ext, name, category) in [("1", "Trail Running Shoes", "Footwear"), ("2", "Desk Lamp", "Lighting")] {
            Product::upsert(
                &db.pool,
                &UpsertProduct {
                    external_id: ext.to_string(),
                    name: name.to_string(),
                    category: category.to_string(),
                    price: 10.0,
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
            .unwrap();
        }
        let mut blog = CreateBlog::manual("Choosing trail shoes", "choosing-trail-shoes", "body");
        blog.category_id = Some(footwear.id);
        Blog::create(&db.pool, Uuid::new_v4(), &blog).await.unwrap();

        let selector = ProductSelector::new(db.pool.clone());
        let ranked = selector
            .select_for_blog("choosing-trail-shoes", &SelectionOptions::default())
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product.name, "Trail Running Shoes");

        assert!(matches!(
            selector.select_for_blog("missing", &SelectionOptions::default()).await,
            Err(RelevanceError::BlogNotFound(_))
        ));
    }
}
