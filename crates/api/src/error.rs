//! HTTP rendering of application errors.
//!
//! Handlers return `Result<_, ApiError>`; every domain error converts into
//! [`AppError`] first, so status codes are decided in one place.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use incident_core::attachment::AttachmentError;
use incident_core::idempotency::IdempotencyError;
use incident_core::incident::IncidentError;
use incident_core::storage::StorageError;
use incident_shared::AppError;
use serde_json::json;

/// Wrapper that renders an [`AppError`] as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.0.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
            "An internal error occurred".to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(json!({
                "error": self.0.error_code(),
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<AttachmentError> for ApiError {
    fn from(err: AttachmentError) -> Self {
        Self(err.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self(err.into())
    }
}

impl From<IncidentError> for ApiError {
    fn from(err: IncidentError) -> Self {
        Self(err.into())
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(err: IdempotencyError) -> Self {
        Self(err.into())
    }
}
