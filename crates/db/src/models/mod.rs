pub mod ad;
pub mod article_title;
pub mod blog;
pub mod category;
pub mod generation;
pub mod product;
