//! Error types for gcr-gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::reconcile::DispatchError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Provider refused or could not take the request (502)
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// gcr-common error
    #[error("Common error: {0}")]
    Common(#[from] gcr_common::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) | ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Dispatch(DispatchError::MissingProviderToken) => "MISSING_PROVIDER_TOKEN",
            ApiError::Dispatch(DispatchError::Unsupported(_)) => "UNSUPPORTED",
            ApiError::Dispatch(_) => "DISPATCH_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Common(_) => "COMMON_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
