use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;

/// Build and configure the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/stats", get(handlers::get_stats))
        // Response cache
        .route("/api/cache/clear", post(handlers::clear_cache))
        // Masked download links
        .route("/api/proxy", post(handlers::create_masked_url))
        .route("/api/proxy", get(handlers::list_masked_urls))
        .route("/api/proxy/{masked_id}", delete(handlers::revoke_masked_url))
        .route(
            "/api/proxy/{masked_id}/extend",
            post(handlers::extend_masked_url),
        )
        .route(
            "/api/proxy/{masked_id}/{filename}",
            get(handlers::proxy_download),
        )
        // Processing markers
        .route("/api/processing/cleanup", post(handlers::cleanup_processing))
        .route(
            "/api/processing/{resource_id}/{variant}",
            get(handlers::processing_status),
        )
        // Middleware
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
