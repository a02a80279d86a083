//! HTTP error type for the LocalHub API.
//!
//! Maps vault and task errors onto status codes. Every error produces a JSON
//! body with a machine-readable `error` kind and a human-readable `message`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use localhub_core::{tasks::TaskError, vault::VaultError};
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "too_large", msg),
            Self::Internal(msg) => {
                error!(%msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound { .. } => Self::NotFound(err.to_string()),
            VaultError::InvalidName { .. } => Self::BadRequest(err.to_string()),
            VaultError::SizeLimit { .. } => Self::PayloadTooLarge(err.to_string()),
            VaultError::Decryption | VaultError::Storage { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound { .. } => Self::NotFound(err.to_string()),
            TaskError::InvalidTitle => Self::BadRequest(err.to_string()),
            TaskError::Storage { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
