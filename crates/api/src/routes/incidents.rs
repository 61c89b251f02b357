//! Incident command routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
};
use incident_core::incident::{BulkStatusRequest, BulkStatusService};
use incident_db::{IdempotencyRepository, IncidentRepository};
use incident_shared::AppError;

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Request header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Response header set when a stored response is replayed.
pub const REPLAYED_HEADER: &str = "x-idempotent-replayed";

/// Creates the incident routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/incidents:bulk-status", post(bulk_status))
}

fn idempotency_key(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .ok_or_else(|| {
            ApiError(AppError::Validation(
                "Idempotency-Key header is required".to_string(),
            ))
        })?
        .to_str()
        .map_err(|_| {
            ApiError(AppError::Validation(
                "Idempotency-Key header must be visible ASCII".to_string(),
            ))
        })
}

/// POST `/incidents:bulk-status`
/// Set the status of many incidents, at most once per idempotency key.
async fn bulk_status(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<BulkStatusRequest>,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers)?;

    let db = (*state.db).clone();
    let service = BulkStatusService::new(
        Arc::new(IncidentRepository::new(db.clone())),
        Arc::new(IdempotencyRepository::new(db)),
        state.idempotency_ttl,
    );
    let outcome = service.execute(key, payload).await?;

    tracing::debug!(
        user_id = %auth.user_id(),
        idempotency_key = key,
        replayed = outcome.replayed,
        "Bulk status handled"
    );

    let mut response = Json(outcome.response).into_response();
    if outcome.replayed {
        response.headers_mut().insert(
            HeaderName::from_static(REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    Ok(response)
}
