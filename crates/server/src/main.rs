use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use server::{AppState, router};
use services::services::{
    config::Config, database_validator::DatabaseValidator, generation_queue::GenerationQueueWorker,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init();

    let config = Config::from_env()?;
    let db = DBService::new(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let validation = DatabaseValidator::new(db.pool.clone()).validate().await?;
    if !validation.is_ok() {
        anyhow::bail!("database is not ready: {}", validation.summary());
    }
    info!("{}", validation.summary());

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(db, config);

    if state.config.generation.queue_worker_enabled {
        match state.auto_blog() {
            Ok(service) => {
                GenerationQueueWorker::new(
                    state.db.pool.clone(),
                    Arc::new(service),
                    &state.config.generation,
                )
                .spawn();
            }
            Err(e) => warn!(error = %e, "Generation queue worker not started"),
        }
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting server at http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
