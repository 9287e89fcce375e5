use axum::{
    Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    response::Json as ResponseJson,
    routing::post,
};
use services::services::product_sync::{HttpProductSource, ProductSyncError, SyncReport};
use sha2::{Digest, Sha256};
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// The secret from `x-cron-secret`, or from `Authorization: Bearer`
fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(CRON_SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.trim());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Constant-time comparison over the SHA-256 digests of both secrets
fn secret_matches(presented: Option<&str>, expected: &str) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// POST /api/cron/sync-products
/// Pull the commerce feed and reconcile the product index
pub async fn sync_products(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<ResponseJson<ApiResponse<SyncReport>>, ApiError> {
    let Some(expected) = state.config.sync.cron_secret.as_deref() else {
        tracing::warn!("Product sync requested but no cron secret is configured");
        return Err(ApiError::ProductSync(ProductSyncError::NotConfigured));
    };
    if !secret_matches(presented_secret(&headers), expected) {
        return Err(ApiError::Unauthorized);
    }

    let feed_url = state
        .config
        .sync
        .feed_url
        .as_deref()
        .ok_or(ProductSyncError::NotConfigured)?;
    let source = HttpProductSource::new(feed_url)?;
    let report = state.product_sync.sync(&source).await?;

    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().route("/cron/sync-products", post(sync_products))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_presented_secret() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_secret(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(presented_secret(&headers), Some("s3cret"));

        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("other"));
        assert_eq!(presented_secret(&headers), Some("other"));
    }

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches(Some("s3cret"), "s3cret"));
        assert!(!secret_matches(Some("s3cre"), "s3cret"));
        assert!(!secret_matches(Some("s3cret-and-more"), "s3cret"));
        assert!(!secret_matches(Some(""), "s3cret"));
        assert!(!secret_matches(None, "s3cret"));
    }
}
