//! Upload endpoint of the loopback storage backend.
//!
//! Mounted only when the loopback backend is active. The slot granted at
//! upload start is the authorization; no bearer token is required.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    routing::put,
};
use bytes::Bytes;
use chrono::Utc;
use incident_shared::AppError;
use tracing::debug;

use crate::{AppState, error::ApiError};

/// Creates the loopback upload route.
///
/// The body limit sits one byte above the policy maximum, so an oversized
/// upload is stored and then rejected by completion with a validation error.
pub fn routes(max_size_bytes: u64) -> Router<AppState> {
    let limit = usize::try_from(max_size_bytes.saturating_add(1)).unwrap_or(usize::MAX);
    Router::new()
        .route("/dev-uploads/{*path}", put(upload))
        .layer(DefaultBodyLimit::max(limit))
}

/// PUT `/dev-uploads/{*path}`
async fn upload(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Some(store) = &state.loopback else {
        return Err(ApiError(AppError::NotFound(
            "loopback storage is not enabled".to_string(),
        )));
    };

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let size = body.len();
    store.absorb_upload(&path, body, content_type, Utc::now())?;

    debug!(path = %path, size, "Loopback upload stored");
    Ok(StatusCode::CREATED)
}
