use crate::api::ApiResponse;
use crate::state::AppState;
use axum::{extract::State, Json};
use vidstate::StateStats;

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StateStats>> {
    Json(ApiResponse::ok(state.stats.snapshot().await))
}
