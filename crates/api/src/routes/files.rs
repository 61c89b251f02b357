//! Anonymous downloads through signed links.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use incident_core::attachment::AttachmentService;
use incident_core::storage::sanitize_file_name;
use incident_db::{AttachmentRepository, ParentRepository};
use incident_shared::AppError;
use incident_shared::types::AttachmentId;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Creates the signed download routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/files/{id}", get(download))
}

/// Signed link query parameters.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    /// Unix expiry in seconds.
    pub expires: i64,
    /// Link signature.
    pub signature: String,
}

/// GET `/files/{id}?expires=&signature=`
/// Stream a completed attachment to the holder of a valid link.
async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !state
        .signer
        .is_valid(&id.to_string(), query.expires, &query.signature)
    {
        return Err(ApiError(AppError::Forbidden(
            "invalid or expired download link".to_string(),
        )));
    }

    let db = (*state.db).clone();
    let service = AttachmentService::new(
        Arc::new(AttachmentRepository::new(db.clone())),
        Arc::new(ParentRepository::new(db)),
        state.storage.clone(),
        state.policy.clone(),
    );
    let cancel = state.shutdown.child_token();
    let (attachment, content) = service
        .open_content(AttachmentId::from_uuid(id), &cancel)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(attachment.file_name())
    );
    Ok((
        [
            (header::CONTENT_TYPE, attachment.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}
