//! Candidate article titles for a product.

use std::sync::Arc;

use db::models::{article_title::ArticleTitle, product::Product};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use utils::text::keywords;

use super::{
    ai_provider::{AiProvider, AiProviderError, ask_json},
    budget::{BudgetError, BudgetService},
};

const TITLE_SYSTEM_PROMPT: &str = "You are an SEO editor for an e-commerce blog. \
     You write specific, click-worthy article titles that help shoppers decide. \
     Respond with JSON only.";

const POWER_WORDS: &[&str] = &[
    "best", "guide", "review", "vs", "how", "why", "top", "ultimate", "complete", "tips",
    "essential", "honest", "worth",
];

#[derive(Debug, Error)]
pub enum TitleGeneratorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Provider(#[from] AiProviderError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error("AI provider returned no usable titles")]
    NoTitles,
}

#[derive(Debug, Deserialize)]
struct TitlesResponse {
    titles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TitleGeneration {
    pub titles: Vec<ArticleTitle>,
    /// False when the product already had titles and nothing was generated
    pub created: bool,
    pub cost: f64,
}

pub struct ArticleTitleGenerator {
    pool: SqlitePool,
    provider: Arc<dyn AiProvider>,
}

impl ArticleTitleGenerator {
    pub fn new(pool: SqlitePool, provider: Arc<dyn AiProvider>) -> Self {
        Self { pool, provider }
    }

    /// Generate and store `count` titles numbered 1..=count. Existing titles are kept as they are.
    pub async fn generate(
        &self,
        product: &Product,
        count: usize,
    ) -> Result<TitleGeneration, TitleGeneratorError> {
        let existing = ArticleTitle::find_by_product_id(&self.pool, product.id).await?;
        if !existing.is_empty() {
            debug!(product_id = %product.id, count = existing.len(), "Titles already exist, skipping");
            return Ok(TitleGeneration {
                titles: existing.into_iter().map(|t| t.into_title()).collect(),
                created: false,
                cost: 0.0,
            });
        }

        let today = BudgetService::today();
        BudgetService::check(&self.pool, today).await?;

        let response = ask_json::<TitlesResponse>(
            self.provider.as_ref(),
            &title_prompt(product, count),
            Some(TITLE_SYSTEM_PROMPT.to_string()),
            1024,
        )
        .await?;
        let cost =
            BudgetService::record_usage(&self.pool, today, &response.model, response.usage).await?;

        let cleaned = clean_titles(response.value.titles, count);
        if cleaned.is_empty() {
            return Err(TitleGeneratorError::NoTitles);
        }

        let mut titles = Vec::with_capacity(cleaned.len());
        for (index, title) in cleaned.iter().enumerate() {
            let score = seo_score(title, &product.name);
            titles.push(
                ArticleTitle::create(&self.pool, product.id, index as i64 + 1, title, score).await?,
            );
        }

        info!(
            product_id = %product.id,
            titles = titles.len(),
            cost = cost,
            "Generated article titles"
        );
        Ok(TitleGeneration {
            titles,
            created: true,
            cost,
        })
    }
}

fn title_prompt(product: &Product, count: usize) -> String {
    let mut prompt = format!(
        "Write {count} distinct blog article titles about this product.\n\n\
         Product: {}\nCategory: {}\nPrice: {:.2}\n",
        product.name,
        product.category,
        product.effective_price()
    );
    let tags = product.tag_list();
    if !tags.is_empty() {
        prompt.push_str(&format!("Tags: {}\n", tags.join(", ")));
    }
    if let Some(description) = product.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("Description: {}\n", description.trim()));
    }
    prompt.push_str(
        "\nMix formats: buying guides, comparisons, how-to articles and reviews. \
         Keep each title between 40 and 65 characters.\n\
         Respond as: {\"titles\": [\"...\"]}",
    );
    prompt
}

/// Trim numbering and quotes, drop blanks and case-insensitive duplicates
fn clean_titles(raw: Vec<String>, count: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut titles = Vec::new();
    for title in raw {
        let title = strip_list_marker(title.trim())
            .trim_matches(|c| c == '"' || c == '\'' || c == '*')
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }
        let key = title.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        titles.push(title);
        if titles.len() == count {
            break;
        }
    }
    titles
}

/// "1. Foo", "2) Foo" and "- Foo" become "Foo"; "10 Best Foo" is left alone
fn strip_list_marker(title: &str) -> &str {
    let digits = title.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &title[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
        return title;
    }
    title.trim_start_matches(['-', '•']).trim_start()
}

/// Heuristic 0..100 rating of a title for search
pub fn seo_score(title: &str, product_name: &str) -> i64 {
    let mut score = 40;
    let length = title.chars().count();
    score += match length {
        40..=65 => 25,
        30..=75 => 15,
        _ => 0,
    };

    let lower = title.to_lowercase();
    let name = product_name.trim().to_lowercase();
    if !name.is_empty() && lower.contains(&name) {
        score += 15;
    } else if keywords(&name).iter().any(|t| lower.contains(t.as_str())) {
        score += 8;
    }

    if title.chars().any(|c| c.is_ascii_digit()) {
        score += 10;
    }
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
    if POWER_WORDS.iter().any(|w| words.contains(w)) {
        score += 10;
    }
    score.clamp(0, 100)
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            generation::{GenerationCost, UpdateGenerationBudget},
            product::UpsertProduct,
        },
    };

    use super::*;
    use crate::services::ai_provider::testing::ScriptedProvider;

    async fn product(db: &DBService) -> Product {
        Product::upsert(
            &db.pool,
            &UpsertProduct {
                external_id: "p-1".to_string(),
                name: "Trail Runner X".to_string(),
                category: "Footwear".to_string(),
                price: 120.0,
                sale_price: None,
                tags: vec!["running".to_string()],
                description: Some("Lightweight trail shoe".to_string()),
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

    #[test]
    fn test_seo_score_rewards_length_name_and_numbers() {
        let strong = seo_score("7 Reasons the Trail Runner X Is the Best Trail Shoe", "Trail Runner X");
        let weak = seo_score("Shoes", "Trail Runner X");
        assert!(strong > weak);
        assert_eq!(strong, 100);
        assert_eq!(weak, 40);
    }

    #[test]
    fn test_clean_titles() {
        let raw = vec![
            "1. \"First title\"".to_string(),
            "first TITLE".to_string(),
            "   ".to_string(),
            "Second".to_string(),
            "Third".to_string(),
        ];
        assert_eq!(clean_titles(raw, 2), vec!["First title", "Second"]);
        assert_eq!(
            clean_titles(vec!["10 Best Trail Shoes".to_string()], 5),
            vec!["10 Best Trail Shoes"]
        );
    }

    #[tokio::test]
    async fn test_generate_stores_numbered_titles_and_records_cost() {
        let db = DBService::new_in_memory().await.unwrap();
        let product = product(&db).await;
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"titles": ["Trail Runner X Review", "How to Pick Trail Shoes", "Trail Runner X vs Rivals"]}"#
                .to_string(),
        )]));
        let generator = ArticleTitleGenerator::new(db.pool.clone(), provider.clone());

        let result = generator.generate(&product, 3).await.unwrap();
        assert!(result.created);
        assert!(result.cost > 0.0);
        let numbers: Vec<i64> = result.titles.iter().map(|t| t.article_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(provider.prompts.lock().unwrap()[0].contains("Trail Runner X"));

        let spent = GenerationCost::total_for_day(&db.pool, BudgetService::today()).await.unwrap();
        assert!((spent - result.cost).abs() < 1e-9);

        // second run reuses the stored titles
        let again = generator.generate(&product, 3).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.titles.len(), 3);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_budget_blocks_before_provider_call() {
        let db = DBService::new_in_memory().await.unwrap();
        let product = product(&db).await;
        BudgetService::update(
            &db.pool,
            &UpdateGenerationBudget {
                daily_budget: Some(0.0),
                monthly_budget: None,
                enforce: Some(true),
            },
        )
        .await
        .unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let generator = ArticleTitleGenerator::new(db.pool.clone(), provider.clone());

        let result = generator.generate(&product, 3).await;
        assert!(matches!(result, Err(TitleGeneratorError::Budget(BudgetError::Exceeded { .. }))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_title_list_is_an_error() {
        let db = DBService::new_in_memory().await.unwrap();
        let product = product(&db).await;
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(r#"{"titles": []}"#.to_string())]));
        let generator = ArticleTitleGenerator::new(db.pool.clone(), provider);
        assert!(matches!(
            generator.generate(&product, 3).await,
            Err(TitleGeneratorError::NoTitles)
        ));
    }
}
