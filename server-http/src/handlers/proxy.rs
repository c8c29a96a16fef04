use crate::api::{
    ApiError, CreateMaskedUrlRequest, CreateMaskedUrlResponse, ExtendMaskedUrlRequest,
    ExtendResponse, ListMaskedUrlsQuery, ListMaskedUrlsResponse, RevokeResponse,
};
use crate::state::AppState;
use crate::validation;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tracing::{debug, info, warn};
use vidstate::masked_path;

const EXPIRED_LINK: &str = "Invalid or expired download link";

/// POST /api/proxy
pub async fn create_masked_url(
    State(state): State<AppState>,
    Json(req): Json<CreateMaskedUrlRequest>,
) -> Result<Json<CreateMaskedUrlResponse>, ApiError> {
    let spec = validation::validate_create(req).map_err(|e| {
        warn!("Invalid masked URL request: {}", e);
        ApiError::bad_request(e.to_string())
    })?;

    let masked_id = state
        .masking
        .create_masked_url(&spec.url, &spec.filename, spec.ttl)?;
    let masked_url = masked_path(&masked_id, &spec.filename);
    info!("CREATE_MASKED_URL: filename={}", spec.filename);

    Ok(Json(CreateMaskedUrlResponse {
        masked_id,
        masked_url,
    }))
}

/// GET /api/proxy?limit=N
pub async fn list_masked_urls(
    State(state): State<AppState>,
    Query(query): Query<ListMaskedUrlsQuery>,
) -> Json<ListMaskedUrlsResponse> {
    let urls = state.masking.list_active(validation::list_limit(&query));

    Json(ListMaskedUrlsResponse {
        count: urls.len(),
        urls,
    })
}

/// GET /api/proxy/:masked_id/:filename
///
/// Redirects to the upstream URL. The filename segment is cosmetic.
pub async fn proxy_download(
    State(state): State<AppState>,
    Path((masked_id, filename)): Path<(String, String)>,
) -> Response {
    match state.masking.resolve(&masked_id) {
        Some(original_url) => {
            debug!(masked_id = %masked_id, filename = %filename, "Redirecting masked download");
            Redirect::temporary(&original_url).into_response()
        }
        None => ApiError::not_found(EXPIRED_LINK).into_response(),
    }
}

/// DELETE /api/proxy/:masked_id
pub async fn revoke_masked_url(
    State(state): State<AppState>,
    Path(masked_id): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    if state.masking.revoke(&masked_id) {
        Ok(Json(RevokeResponse { revoked: true }))
    } else {
        Err(ApiError::not_found(EXPIRED_LINK))
    }
}

/// POST /api/proxy/:masked_id/extend
pub async fn extend_masked_url(
    State(state): State<AppState>,
    Path(masked_id): Path<String>,
    Json(req): Json<ExtendMaskedUrlRequest>,
) -> Result<Json<ExtendResponse>, ApiError> {
    let extra = validation::validate_extend(&req)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    if !state.masking.extend_ttl(&masked_id, extra) {
        return Err(ApiError::not_found(EXPIRED_LINK));
    }

    // The entry may have been revoked between the two calls
    let time_to_expire_secs = state
        .masking
        .describe(&masked_id)
        .map(|view| view.time_to_expire_secs)
        .unwrap_or(0);

    Ok(Json(ExtendResponse {
        extended: true,
        time_to_expire_secs,
    }))
}
