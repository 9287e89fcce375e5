use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod ads;
pub mod ai_providers;
pub mod blogs;
pub mod budget;
pub mod generation;
pub mod health;
pub mod products;
pub mod sync;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(health::router(&state))
        .merge(products::router(&state))
        .merge(blogs::router(&state))
        .merge(generation::router(&state))
        .merge(ai_providers::router(&state))
        .merge(ads::router(&state))
        .merge(sync::router(&state));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
