pub mod ad_delivery;
pub mod ai_provider;
pub mod auto_blog;
pub mod blog_generator;
pub mod budget;
pub mod config;
pub mod database_validator;
pub mod generation_queue;
pub mod pricing;
pub mod product_sync;
pub mod relevance;
pub mod title_generator;
