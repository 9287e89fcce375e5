use std::{env, fs, path::Path};

use ts_rs::TS;

fn generate_types_content() -> String {
    let decls = [
        db::models::product::SyncStatus::decl(),
        db::models::product::Product::decl(),
        db::models::product::UpsertProduct::decl(),
        db::models::category::Category::decl(),
        db::models::article_title::ArticleTitle::decl(),
        db::models::article_title::ArticleTitleWithBlog::decl(),
        db::models::blog::BlogStatus::decl(),
        db::models::blog::BlogSource::decl(),
        db::models::blog::LinkPlacement::decl(),
        db::models::blog::Blog::decl(),
        db::models::blog::BlogProductLink::decl(),
        db::models::generation::QueueStatus::decl(),
        db::models::generation::GenerationQueueItem::decl(),
        db::models::generation::GenerationCost::decl(),
        db::models::generation::GenerationBudget::decl(),
        db::models::generation::UpdateGenerationBudget::decl(),
        db::models::generation::ExclusionKind::decl(),
        db::models::generation::GenerationExclusion::decl(),
        db::models::generation::CreateGenerationExclusion::decl(),
        db::models::ad::CampaignStatus::decl(),
        db::models::ad::AdPlacement::decl(),
        db::models::ad::TargetType::decl(),
        db::models::ad::AdCampaign::decl(),
        db::models::ad::AdItem::decl(),
        services::services::ai_provider::AiProviderKind::decl(),
        services::services::ai_provider::TokenUsage::decl(),
        services::services::ai_provider::ConnectionTest::decl(),
        services::services::relevance::ScoreBreakdown::decl(),
        services::services::relevance::ScoredProduct::decl(),
        services::services::title_generator::TitleGeneration::decl(),
        services::services::auto_blog::ProductGenerationState::decl(),
        services::services::auto_blog::ProductGenerationStatus::decl(),
        services::services::auto_blog::GenerationOutcome::decl(),
        services::services::auto_blog::ProductGenerationResult::decl(),
        services::services::auto_blog::BatchProgress::decl(),
        services::services::budget::BudgetStatus::decl(),
        services::services::ad_delivery::AdRequest::decl(),
        services::services::ad_delivery::AdSource::decl(),
        services::services::ad_delivery::ServedAd::decl(),
        services::services::ad_delivery::AdServeResponse::decl(),
        services::services::product_sync::SyncReport::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::products::ProductPage::decl(),
        server::routes::products::UpdateProductPriority::decl(),
        server::routes::blogs::SlugCheck::decl(),
        server::routes::generation::StartBatchRequest::decl(),
        server::routes::generation::EnqueueRequest::decl(),
        server::routes::ai_providers::AiProviderInfo::decl(),
        utils::response::ApiResponse::<()>::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| {
            let trimmed = d.trim_start();
            if trimmed.starts_with("export") {
                d
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "// This file was generated by `cargo run --bin generate_types`. Do not edit it by hand.\n\n{body}\n"
    )
}

fn main() {
    let check_mode = env::args().any(|arg| arg == "--check");
    let shared_path = Path::new("shared");
    let types_path = shared_path.join("types.ts");
    let generated = generate_types_content();

    if check_mode {
        let current = fs::read_to_string(&types_path).unwrap_or_default();
        if current == generated {
            println!("✅ shared/types.ts is up to date.");
            std::process::exit(0);
        } else {
            eprintln!("❌ shared/types.ts is not up to date. Please run 'cargo run --bin generate_types' and commit the changes.");
            std::process::exit(1);
        }
    }

    if let Err(e) = fs::create_dir_all(shared_path) {
        eprintln!("Failed to create {}: {e}", shared_path.display());
        std::process::exit(1);
    }
    if let Err(e) = fs::write(&types_path, generated) {
        eprintln!("Failed to write {}: {e}", types_path.display());
        std::process::exit(1);
    }
    println!("✅ TypeScript types generated in shared/types.ts");
}
