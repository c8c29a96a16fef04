use crate::api::{CleanupResponse, ProcessingStatusResponse};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

/// GET /api/processing/:resource_id/:variant
pub async fn processing_status(
    State(state): State<AppState>,
    Path((resource_id, variant)): Path<(String, String)>,
) -> Json<ProcessingStatusResponse> {
    let processing = state.tracker.is_processing(&resource_id, &variant).await;

    Json(ProcessingStatusResponse {
        resource_id,
        variant,
        processing,
    })
}

/// POST /api/processing/cleanup
///
/// Hook for an external scheduler; removes records past the stale timeout.
pub async fn cleanup_processing(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = state.tracker.cleanup_expired().await;
    info!("CLEANUP_PROCESSING: removed={}", removed);

    Json(CleanupResponse { removed })
}
