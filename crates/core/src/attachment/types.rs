//! Attachment aggregate and its inputs/results.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use incident_shared::types::{AttachmentId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AttachmentError;
use super::policy::{AttachmentPolicy, MAX_FILE_NAME_CHARS};

/// Storage path held by an attachment until its upload slot exists.
pub const PENDING_STORAGE_PATH: &str = "pending";

/// Which kind of entity owns an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    /// No owner. Never valid for a persisted attachment.
    #[default]
    None,
    /// An incident report.
    Incident,
    /// A comment on an incident.
    Comment,
}

impl ParentType {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Incident => "incident",
            Self::Comment => "comment",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "incident" => Some(Self::Incident),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }

    /// Storage path prefix for a parent of this kind.
    #[must_use]
    pub fn storage_prefix(&self, parent_id: Uuid) -> Option<String> {
        match self {
            Self::None => None,
            Self::Incident => Some(format!("incidents/{parent_id}")),
            Self::Comment => Some(format!("comments/{parent_id}")),
        }
    }
}

impl fmt::Display for ParentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment lifecycle status.
///
/// `Pending -> Completed -> Blocked`. Nothing ever returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    /// Slot issued, waiting for the client to upload and complete.
    Pending,
    /// Upload verified.
    Completed,
    /// Withheld by moderation.
    Blocked,
}

impl AttachmentStatus {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields needed to create a pending attachment.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    /// Owner kind.
    pub parent_type: ParentType,
    /// Owner id.
    pub parent_id: Uuid,
    /// Client-supplied file name.
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Actor starting the upload.
    pub uploaded_by: UserId,
}

/// Flat persisted form of an [`Attachment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSnapshot {
    /// Attachment id.
    pub id: AttachmentId,
    /// Owner kind.
    pub parent_type: ParentType,
    /// Owner id.
    pub parent_id: Uuid,
    /// Client-supplied file name.
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Stored size in bytes.
    pub size: Option<u64>,
    /// Lifecycle status.
    pub status: AttachmentStatus,
    /// Backend key.
    pub storage_path: String,
    /// Actor who started the upload.
    pub uploaded_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether a derivative was generated.
    pub has_thumbnail: bool,
    /// Optimistic concurrency version.
    pub version: i32,
}

/// Attachment aggregate root.
///
/// Fields are private so every mutation goes through a state transition.
/// `size` and `completed_at` are set exactly when the upload has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    id: AttachmentId,
    parent_type: ParentType,
    parent_id: Uuid,
    file_name: String,
    content_type: String,
    size: Option<u64>,
    status: AttachmentStatus,
    storage_path: String,
    uploaded_by: UserId,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    has_thumbnail: bool,
    version: i32,
}

impl Attachment {
    /// Create a pending attachment with the placeholder storage path.
    ///
    /// The file name is stored trimmed and the content type trimmed and
    /// lowercased, the forms the policy checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent type is `None`, the file name is empty,
    /// or the content type is not allowed by the policy.
    pub fn new_pending(
        input: NewAttachment,
        policy: &AttachmentPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, AttachmentError> {
        if input.parent_type == ParentType::None {
            return Err(AttachmentError::InvalidParentType);
        }
        let file_name = input.file_name.trim();
        if file_name.is_empty() {
            return Err(AttachmentError::invalid_file_name("file name is empty"));
        }
        if file_name.chars().count() > MAX_FILE_NAME_CHARS {
            return Err(AttachmentError::invalid_file_name(format!(
                "file name exceeds {MAX_FILE_NAME_CHARS} characters"
            )));
        }
        if !policy.is_content_type_allowed(&input.content_type) {
            return Err(AttachmentError::InvalidContentType(input.content_type));
        }

        Ok(Self {
            id: AttachmentId::new(),
            parent_type: input.parent_type,
            parent_id: input.parent_id,
            file_name: file_name.to_string(),
            content_type: input.content_type.trim().to_ascii_lowercase(),
            size: None,
            status: AttachmentStatus::Pending,
            storage_path: PENDING_STORAGE_PATH.to_string(),
            uploaded_by: input.uploaded_by,
            created_at: now,
            completed_at: None,
            has_thumbnail: false,
            version: 1,
        })
    }

    /// Rebuild from persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot breaks an aggregate invariant.
    pub fn from_snapshot(snapshot: AttachmentSnapshot) -> Result<Self, AttachmentError> {
        let corrupt = |reason: &str| {
            AttachmentError::repository(format!("attachment {} is corrupt: {reason}", snapshot.id))
        };

        if snapshot.storage_path.is_empty() {
            return Err(corrupt("empty storage path"));
        }
        let has_completion = snapshot.size.is_some() && snapshot.completed_at.is_some();
        let has_no_completion = snapshot.size.is_none() && snapshot.completed_at.is_none();
        match snapshot.status {
            AttachmentStatus::Pending if !has_no_completion => {
                return Err(corrupt("pending attachment carries completion data"));
            }
            AttachmentStatus::Completed | AttachmentStatus::Blocked if !has_completion => {
                return Err(corrupt("completed attachment lacks size or completion time"));
            }
            _ => {}
        }

        Ok(Self {
            id: snapshot.id,
            parent_type: snapshot.parent_type,
            parent_id: snapshot.parent_id,
            file_name: snapshot.file_name,
            content_type: snapshot.content_type,
            size: snapshot.size,
            status: snapshot.status,
            storage_path: snapshot.storage_path,
            uploaded_by: snapshot.uploaded_by,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
            has_thumbnail: snapshot.has_thumbnail,
            version: snapshot.version,
        })
    }

    /// Flatten for persistence.
    #[must_use]
    pub fn to_snapshot(&self) -> AttachmentSnapshot {
        AttachmentSnapshot {
            id: self.id,
            parent_type: self.parent_type,
            parent_id: self.parent_id,
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
            status: self.status,
            storage_path: self.storage_path.clone(),
            uploaded_by: self.uploaded_by,
            created_at: self.created_at,
            completed_at: self.completed_at,
            has_thumbnail: self.has_thumbnail,
            version: self.version,
        }
    }

    /// Replace the placeholder path with the path of the issued slot.
    ///
    /// # Errors
    ///
    /// Returns an error unless the attachment is pending and the path is non-empty.
    pub fn assign_storage_path(&mut self, path: impl Into<String>) -> Result<(), AttachmentError> {
        self.require(AttachmentStatus::Pending, "assign storage path")?;
        let path = path.into();
        if path.is_empty() {
            return Err(AttachmentError::repository("storage path must not be empty"));
        }
        self.storage_path = path;
        Ok(())
    }

    /// Mark the upload as completed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the attachment is pending.
    pub fn complete(
        &mut self,
        size: u64,
        has_thumbnail: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        self.require(AttachmentStatus::Pending, "complete")?;
        self.status = AttachmentStatus::Completed;
        self.size = Some(size);
        self.completed_at = Some(now);
        self.has_thumbnail = has_thumbnail;
        Ok(())
    }

    /// Record the result of rewriting the stored object.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the attachment is completed.
    pub fn apply_sanitized(
        &mut self,
        size: u64,
        content_type: Option<String>,
    ) -> Result<(), AttachmentError> {
        self.require(AttachmentStatus::Completed, "apply sanitized content")?;
        self.size = Some(size);
        if let Some(content_type) = content_type {
            self.content_type = content_type;
        }
        Ok(())
    }

    /// Withhold a completed attachment (moderation).
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the attachment is completed.
    pub fn block(&mut self) -> Result<(), AttachmentError> {
        self.require(AttachmentStatus::Completed, "block")?;
        self.status = AttachmentStatus::Blocked;
        Ok(())
    }

    /// Return a copy carrying the next version, as stored after an update.
    #[must_use]
    pub fn with_next_version(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }

    fn require(
        &self,
        expected: AttachmentStatus,
        action: &'static str,
    ) -> Result<(), AttachmentError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(AttachmentError::InvalidTransition {
                id: self.id,
                from: self.status,
                action,
            })
        }
    }

    /// Attachment id.
    #[must_use]
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// Owner kind.
    #[must_use]
    pub fn parent_type(&self) -> ParentType {
        self.parent_type
    }

    /// Owner id.
    #[must_use]
    pub fn parent_id(&self) -> Uuid {
        self.parent_id
    }

    /// Client-supplied file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Declared (or sanitized) MIME type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Stored size, once completed.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Lifecycle status.
    #[must_use]
    pub fn status(&self) -> AttachmentStatus {
        self.status
    }

    /// Backend key. Never exposed to clients.
    #[must_use]
    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    /// Whether the slot has not been issued yet.
    #[must_use]
    pub fn has_placeholder_path(&self) -> bool {
        self.storage_path == PENDING_STORAGE_PATH
    }

    /// Actor who started the upload.
    #[must_use]
    pub fn uploaded_by(&self) -> UserId {
        self.uploaded_by
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Completion time.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Whether a derivative was generated.
    #[must_use]
    pub fn has_thumbnail(&self) -> bool {
        self.has_thumbnail
    }

    /// Optimistic concurrency version.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }
}

/// Input for starting an upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadInput {
    /// Owner kind.
    pub parent_type: ParentType,
    /// Owner id.
    pub parent_id: Uuid,
    /// Client-supplied file name.
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
}

/// Result of starting an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResult {
    /// New attachment id.
    pub attachment_id: AttachmentId,
    /// Where the client uploads the bytes.
    pub upload_url: String,
    /// Storage path of the upload.
    pub storage_path: String,
    /// HTTP method for the upload.
    pub method: String,
    /// Headers the client must send.
    pub headers: HashMap<String, String>,
    /// When the upload URL expires.
    pub expires_at: DateTime<Utc>,
}
