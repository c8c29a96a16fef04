use crate::api::ClearCacheResponse;
use crate::state::AppState;
use axum::{extract::State, Json};
use tracing::info;

/// POST /api/cache/clear
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    let removed = state.cache.clear();
    info!("Cache cleared: {} items removed", removed);

    Json(ClearCacheResponse {
        success: true,
        message: format!("Cache cleared successfully. {} items removed.", removed),
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_state;
    use serde_json::json;

    #[tokio::test]
    async fn test_clear_cache_reports_removed_count() {
        let (state, _clock) = test_state();
        state.cache.set_default("a", json!(1)).unwrap();
        state.cache.set_default("b", json!(2)).unwrap();

        let Json(response) = clear_cache(State(state.clone())).await;

        assert!(response.success);
        assert_eq!(response.removed, 2);
        assert_eq!(state.cache.size(), 0);

        let Json(again) = clear_cache(State(state)).await;
        assert_eq!(again.removed, 0);
    }
}
