//! Full article bodies written from a stored title.

use std::sync::Arc;

use db::models::{
    article_title::ArticleTitle,
    blog::{Blog, BlogProduct, BlogSource, BlogStatus, CreateBlog, LinkPlacement},
    category::Category,
    product::Product,
};
use serde::{Deserialize, Deserializer};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use utils::text::{slugify, unique_slug};
use uuid::Uuid;

use super::{
    ai_provider::{AiProvider, AiProviderError, ask_json},
    budget::{BudgetError, BudgetService},
    relevance::{MatchTarget, ProductSelector, RelevanceError, ScoredProduct, SelectionOptions},
};

const ARTICLE_SYSTEM_PROMPT: &str = "You are a senior writer for an e-commerce blog. \
     You write helpful, honest long-form articles in markdown that naturally recommend products. \
     Respond with JSON only.";

#[derive(Debug, Error)]
pub enum BlogGeneratorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Provider(#[from] AiProviderError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Relevance(#[from] RelevanceError),
    #[error("article already exists for title {0}")]
    AlreadyWritten(Uuid),
    #[error("slug {0} is taken by another article")]
    SlugConflict(String),
    #[error("AI provider returned an empty article")]
    EmptyContent,
}

#[derive(Debug, Deserialize)]
struct ArticleDraft {
    #[serde(default)]
    excerpt: Option<String>,
    content: String,
    #[serde(default, deserialize_with = "keyword_list")]
    keywords: Vec<String>,
}

/// Providers answer with either `["a", "b"]` or `"a, b"`
fn keyword_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Keywords {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Keywords>::deserialize(deserializer)? {
        Some(Keywords::List(list)) => list,
        Some(Keywords::Text(text)) => utils::text::split_list(&text),
        None => Vec::new(),
    })
}

#[derive(Debug, Clone)]
pub struct GeneratedArticle {
    pub blog: Blog,
    /// Products linked from the article, the generating product included
    pub linked_products: usize,
    pub cost: f64,
}

pub struct BlogGenerator {
    pool: SqlitePool,
    provider: Arc<dyn AiProvider>,
    related_products: usize,
}

impl BlogGenerator {
    pub fn new(pool: SqlitePool, provider: Arc<dyn AiProvider>, related_products: usize) -> Self {
        Self {
            pool,
            provider,
            related_products,
        }
    }

    pub async fn generate(
        &self,
        product: &Product,
        title: &ArticleTitle,
    ) -> Result<GeneratedArticle, BlogGeneratorError> {
        let today = BudgetService::today();
        BudgetService::check(&self.pool, today).await?;

        let response = ask_json::<ArticleDraft>(
            self.provider.as_ref(),
            &article_prompt(product, &title.title),
            Some(ARTICLE_SYSTEM_PROMPT.to_string()),
            4096,
        )
        .await?;
        let cost =
            BudgetService::record_usage(&self.pool, today, &response.model, response.usage).await?;

        let draft = response.value;
        if draft.content.trim().is_empty() {
            return Err(BlogGeneratorError::EmptyContent);
        }
        let content = ensure_product_link(draft.content.trim(), product);

        let keywords = draft
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>();

        let related = if self.related_products == 0 {
            Vec::new()
        } else {
            let target = MatchTarget::from_text(
                Some(product.category.as_str()),
                &format!("{} {}", title.title, keywords.join(" ")),
            );
            let options = SelectionOptions {
                limit: self.related_products,
                exclude: vec![product.id],
                ..SelectionOptions::default()
            };
            ProductSelector::new(self.pool.clone())
                .select_for_target(&target, &options)
                .await?
        };

        let category = Category::find_by_name(&self.pool, &product.category).await?;
        let slug = self.unique_slug_for(&title.title).await?;

        let data = CreateBlog {
            title: title.title.clone(),
            slug,
            content,
            excerpt: draft.excerpt.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            category_id: category.map(|c| c.id),
            keywords: (!keywords.is_empty()).then(|| keywords.join(",")),
            status: Some(BlogStatus::Draft),
            source: Some(BlogSource::AiGenerated),
            product_id: Some(product.id),
            article_title_id: Some(title.id),
        };

        let blog = self.store(title, product, data, &related).await?;

        info!(
            blog_id = %blog.id,
            product_id = %product.id,
            slug = %blog.slug,
            related = related.len(),
            cost = cost,
            "Generated article"
        );
        Ok(GeneratedArticle {
            blog,
            linked_products: related.len() + 1,
            cost,
        })
    }

    /// Insert the article and its product links in one transaction. A slug
    /// taken between lookup and insert is recomputed once; a title that already
    /// has an article is reported as [`BlogGeneratorError::AlreadyWritten`].
    async fn store(
        &self,
        title: &ArticleTitle,
        product: &Product,
        mut data: CreateBlog,
        related: &[ScoredProduct],
    ) -> Result<Blog, BlogGeneratorError> {
        let mut retried = false;
        loop {
            match self.insert_with_links(product, &data, related).await {
                Ok(blog) => return Ok(blog),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    if Blog::find_by_article_title_id(&self.pool, title.id).await?.is_some() {
                        warn!(title_id = %title.id, "Article was written concurrently, discarding duplicate");
                        return Err(BlogGeneratorError::AlreadyWritten(title.id));
                    }
                    if retried {
                        return Err(BlogGeneratorError::SlugConflict(data.slug));
                    }
                    let slug = self.unique_slug_for(&title.title).await?;
                    warn!(title_id = %title.id, taken = %data.slug, slug = %slug, "Slug was taken, retrying");
                    data.slug = slug;
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn insert_with_links(
        &self,
        product: &Product,
        data: &CreateBlog,
        related: &[ScoredProduct],
    ) -> Result<Blog, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let blog = Blog::create(&mut *tx, Uuid::new_v4(), data).await?;
        BlogProduct::link(&mut *tx, blog.id, product.id, &product.name, LinkPlacement::Featured)
            .await?;
        for scored in related {
            BlogProduct::link(
                &mut *tx,
                blog.id,
                scored.product.id,
                &scored.product.name,
                LinkPlacement::Inline,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(blog)
    }

    async fn unique_slug_for(&self, title: &str) -> Result<String, sqlx::Error> {
        let mut base = slugify(title);
        if base.is_empty() {
            base = "article".to_string();
        }
        let taken = Blog::slugs_like(&self.pool, &base).await?;
        Ok(unique_slug(&base, |candidate| taken.iter().any(|s| s == candidate)))
    }
}

fn article_prompt(product: &Product, title: &str) -> String {
    let mut prompt = format!(
        "Write a blog article titled \"{title}\".\n\n\
         Featured product: {}\nCategory: {}\nPrice: {:.2}\n",
        product.name,
        product.category,
        product.effective_price()
    );
    if let Some(description) = product.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("Description: {}\n", description.trim()));
    }
    prompt.push_str(&format!("Product link: {}\n", product_href(product)));
    prompt.push_str(
        "\nUse markdown headings, 800 to 1200 words, and link the featured product at least once \
         using the product link.\n\
         Respond as: {\"excerpt\": \"one or two sentences\", \"content\": \"markdown\", \
         \"keywords\": [\"...\"]}",
    );
    prompt
}

fn product_href(product: &Product) -> String {
    product
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| format!("/products/{}", product.external_id))
}

/// Append a markdown link to the product when the body never links to it
pub fn ensure_product_link(content: &str, product: &Product) -> String {
    let href = product_href(product);
    if content.contains(&format!("]({href})")) {
        return content.to_string();
    }
    format!(
        "{content}\n\nReady to try it? Check out [{}]({href}).",
        product.name
    )
}
