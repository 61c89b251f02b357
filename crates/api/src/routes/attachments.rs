//! Attachment upload lifecycle routes.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use incident_core::attachment::{
    Attachment, AttachmentService, AttachmentStatus, ParentType, StartUploadInput,
    StartUploadResult,
};
use incident_db::{AttachmentRepository, ParentRepository};
use incident_shared::AppError;
use incident_shared::types::{AttachmentId, UserId};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the attachment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/attachments:start", post(start_upload))
        .route("/attachments", get(list_attachments))
        // `{id}:complete` and `{id}:abort` share the segment with the id
        .route(
            "/attachments/{id}",
            get(get_attachment).post(attachment_command),
        )
        .route("/attachments/{id}/download-link", get(download_link))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query for listing the attachments of a parent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAttachmentsQuery {
    /// Owner kind.
    pub parent_type: ParentType,
    /// Owner id.
    pub parent_id: Uuid,
}

/// Attachment metadata. The storage path is never exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    /// Attachment ID.
    pub id: AttachmentId,
    /// Owner kind.
    pub parent_type: ParentType,
    /// Owner id.
    pub parent_id: Uuid,
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes, once completed.
    pub size: Option<u64>,
    /// Lifecycle status.
    pub status: AttachmentStatus,
    /// Uploader.
    pub uploaded_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether a derivative exists.
    pub has_thumbnail: bool,
}

impl From<&Attachment> for AttachmentResponse {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id(),
            parent_type: attachment.parent_type(),
            parent_id: attachment.parent_id(),
            file_name: attachment.file_name().to_string(),
            content_type: attachment.content_type().to_string(),
            size: attachment.size(),
            status: attachment.status(),
            uploaded_by: attachment.uploaded_by(),
            created_at: attachment.created_at(),
            completed_at: attachment.completed_at(),
            has_thumbnail: attachment.has_thumbnail(),
        }
    }
}

/// Anonymous download link.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLinkResponse {
    /// Relative URL of the signed link.
    pub url: String,
    /// When the link stops working.
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle command addressed as `{id}:{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Complete,
    Abort,
}

// ============================================================================
// Helper Functions
// ============================================================================

type Service = AttachmentService<AttachmentRepository, ParentRepository>;

fn attachment_service(state: &AppState) -> Service {
    let db = (*state.db).clone();
    AttachmentService::new(
        Arc::new(AttachmentRepository::new(db.clone())),
        Arc::new(ParentRepository::new(db)),
        state.storage.clone(),
        state.policy.clone(),
    )
    .with_sanitizer(state.sanitizer.clone())
}

fn parse_command(target: &str) -> Result<(AttachmentId, Command), ApiError> {
    let (id, action) = target
        .rsplit_once(':')
        .ok_or_else(|| ApiError(AppError::NotFound(format!("route /attachments/{target}"))))?;

    let command = match action {
        "complete" => Command::Complete,
        "abort" => Command::Abort,
        _ => {
            return Err(ApiError(AppError::NotFound(format!(
                "attachment command: {action}"
            ))));
        }
    };
    let id = AttachmentId::from_str(id)
        .map_err(|_| ApiError(AppError::Validation(format!("invalid attachment id: {id}"))))?;

    Ok((id, command))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/attachments:start`
/// Create a pending attachment and issue an upload slot.
async fn start_upload(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<StartUploadInput>,
) -> Result<Json<StartUploadResult>, ApiError> {
    let cancel = state.shutdown.child_token();
    let result = attachment_service(&state)
        .start(payload, auth.user_id(), &cancel)
        .await?;

    Ok(Json(result))
}

/// POST `/attachments/{id}:complete` and `/attachments/{id}:abort`
async fn attachment_command(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (id, command) = parse_command(&target)?;
    let cancel = state.shutdown.child_token();
    let service = attachment_service(&state);

    match command {
        Command::Complete => {
            let attachment = service.complete(id, &cancel).await?;
            info!(
                attachment_id = %id,
                user_id = %auth.user_id(),
                size = attachment.size().unwrap_or_default(),
                "Attachment completed"
            );
        }
        Command::Abort => {
            service
                .abort(id, auth.user_id(), auth.is_admin(), &cancel)
                .await?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// GET `/attachments/{id}`
async fn get_attachment(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(target): Path<String>,
) -> Result<Json<AttachmentResponse>, ApiError> {
    let id = AttachmentId::from_str(&target)
        .map_err(|_| ApiError(AppError::Validation(format!("invalid attachment id: {target}"))))?;
    let attachment = attachment_service(&state).get(id).await?;

    Ok(Json(AttachmentResponse::from(&attachment)))
}

/// GET `/attachments?parentType=&parentId=`
async fn list_attachments(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListAttachmentsQuery>,
) -> Result<Json<Vec<AttachmentResponse>>, ApiError> {
    let attachments = attachment_service(&state)
        .list_by_parent(query.parent_type, query.parent_id)
        .await?;

    Ok(Json(
        attachments.iter().map(AttachmentResponse::from).collect(),
    ))
}

/// GET `/attachments/{id}/download-link`
async fn download_link(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadLinkResponse>, ApiError> {
    let id = AttachmentId::from_uuid(id);
    let attachment = attachment_service(&state).get(id).await?;
    if attachment.status() != AttachmentStatus::Completed {
        return Err(ApiError(AppError::Conflict(format!(
            "attachment {id} is {}",
            attachment.status()
        ))));
    }

    let link = state
        .signer
        .sign(&id.to_string(), state.download_link_ttl, Utc::now())
        .map_err(|e| ApiError(AppError::Internal(e.to_string())))?;
    info!(attachment_id = %id, user_id = %auth.user_id(), "Download link issued");

    Ok(Json(DownloadLinkResponse {
        url: format!(
            "/api/v1/files/{id}?expires={}&signature={}",
            link.expires, link.signature
        ),
        expires_at: DateTime::from_timestamp(link.expires, 0).unwrap_or_else(Utc::now),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let id = AttachmentId::new();

        let (parsed, command) = parse_command(&format!("{id}:complete")).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(command, Command::Complete);

        let (_, command) = parse_command(&format!("{id}:abort")).unwrap();
        assert_eq!(command, Command::Abort);
    }

    #[test]
    fn test_parse_command_rejects_unknown_action() {
        let id = AttachmentId::new();
        let err = parse_command(&format!("{id}:publish")).unwrap_err();
        assert_eq!(err.0.status_code(), 404);

        let err = parse_command(&id.to_string()).unwrap_err();
        assert_eq!(err.0.status_code(), 404);
    }

    #[test]
    fn test_parse_command_rejects_bad_id() {
        let err = parse_command("not-a-uuid:complete").unwrap_err();
        assert_eq!(err.0.status_code(), 400);
    }
}
