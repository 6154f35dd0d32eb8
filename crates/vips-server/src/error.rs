//! ============================================================================
//! API Errors - HTTP mapping for the platform error taxonomy
//! ============================================================================
//! Every error response carries the structured body
//! `{"status": "error", "message": ...}` so the miniapp can branch on the
//! status field instead of parsing HTTP codes.
//! ============================================================================

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use vips_core::PlatformError;

#[derive(Debug)]
pub enum ApiError {
    Platform(PlatformError),
    Unauthorized(String),
    Forbidden(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Platform(e) => write!(f, "{}", e),
            ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        ApiError::Platform(e)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Platform(PlatformError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Platform(PlatformError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Platform(PlatformError::InsufficientBalance { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Platform(PlatformError::ExternalService(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Platform(PlatformError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }))
    }
}
