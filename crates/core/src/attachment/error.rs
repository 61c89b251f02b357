//! Attachment error types.

use incident_shared::AppError;
use incident_shared::types::AttachmentId;
use thiserror::Error;
use uuid::Uuid;

use super::types::{AttachmentStatus, ParentType};
use crate::storage::StorageError;

/// Attachment operation errors.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Attachment not found.
    #[error("attachment not found: {0}")]
    NotFound(AttachmentId),

    /// The owning incident or comment does not exist.
    #[error("{parent_type} not found: {parent_id}")]
    ParentNotFound {
        /// Owner kind.
        parent_type: ParentType,
        /// Owner id.
        parent_id: Uuid,
    },

    /// State machine violation.
    #[error("cannot {action} attachment {id} in status {from}")]
    InvalidTransition {
        /// Attachment id.
        id: AttachmentId,
        /// Current status.
        from: AttachmentStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// Nothing was uploaded to the slot.
    #[error("uploaded object missing for attachment {0}")]
    UploadMissing(AttachmentId),

    /// Parent type is `None`.
    #[error("parent type is required")]
    InvalidParentType,

    /// Content type not allowed by policy.
    #[error("content type not allowed: {0}")]
    InvalidContentType(String),

    /// Stored object does not have the declared content type.
    #[error("content type mismatch: declared {declared}, stored {}", observed.as_deref().unwrap_or("none"))]
    ContentTypeMismatch {
        /// Declared at start.
        declared: String,
        /// Observed in storage.
        observed: Option<String>,
    },

    /// Stored object is empty or too large.
    #[error("invalid size: {size} bytes (allowed 1..={max})")]
    InvalidSize {
        /// Observed size.
        size: u64,
        /// Policy maximum.
        max: u64,
    },

    /// File name failed validation.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// Actor may not perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Another request updated the attachment first.
    #[error("attachment {0} was modified concurrently")]
    ConcurrentModification(AttachmentId),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl AttachmentError {
    /// Create an invalid file name error.
    #[must_use]
    pub fn invalid_file_name(msg: impl Into<String>) -> Self {
        Self::InvalidFileName(msg.into())
    }

    /// Create a forbidden error.
    #[must_use]
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Whether the error is a cancellation, directly or from storage.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Storage(StorageError::Cancelled))
    }
}

impl From<AttachmentError> for AppError {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::NotFound(_) | AttachmentError::ParentNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            AttachmentError::InvalidTransition { .. }
            | AttachmentError::ConcurrentModification(_) => Self::Conflict(err.to_string()),
            AttachmentError::UploadMissing(_) => Self::PreconditionFailed(err.to_string()),
            AttachmentError::InvalidParentType
            | AttachmentError::InvalidContentType(_)
            | AttachmentError::ContentTypeMismatch { .. }
            | AttachmentError::InvalidSize { .. }
            | AttachmentError::InvalidFileName(_) => Self::Validation(err.to_string()),
            AttachmentError::Forbidden(_) => Self::Forbidden(err.to_string()),
            AttachmentError::Storage(storage) => storage.into(),
            AttachmentError::Repository(msg) => Self::Database(msg),
            AttachmentError::Cancelled => Self::ServiceUnavailable(err.to_string()),
        }
    }
}
