use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use vidstate::MaskedUrlView;

#[derive(Serialize)]
pub struct HealthResponse {
    pub message: String,
}

/// Successful envelope: `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Status code plus `{success: false, error}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse::new(error),
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }
}

impl From<shared::Error> for ApiError {
    fn from(err: shared::Error) -> Self {
        match err {
            shared::Error::NotFound => Self::not_found(err.to_string()),
            shared::Error::InvalidInput(_) | shared::Error::InvalidTtl => {
                Self::bad_request(err.to_string())
            }
            shared::Error::Storage(_) | shared::Error::Timeout(_) | shared::Error::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// === Masking Proxy Models ===

#[derive(Debug, Serialize)]
pub struct CreateMaskedUrlResponse {
    pub masked_id: String,
    pub masked_url: String,
}

#[derive(Debug, Serialize)]
pub struct ListMaskedUrlsResponse {
    pub count: usize,
    pub urls: Vec<MaskedUrlView>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtendResponse {
    pub extended: bool,
    pub time_to_expire_secs: u64,
}

// === Cache / Processing Models ===

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct ProcessingStatusResponse {
    pub resource_id: String,
    pub variant: String,
    pub processing: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}
