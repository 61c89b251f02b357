//! Upload lifecycle: start, complete, abort.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use incident_shared::types::{AttachmentId, UserId};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::AttachmentError;
use super::policy::AttachmentPolicy;
use super::types::{
    Attachment, AttachmentStatus, NewAttachment, ParentType, StartUploadInput, StartUploadResult,
};
use crate::sanitize::{ImageSanitizer, SanitizeError};
use crate::storage::{BlobStorage, StorageError, UploadSlotRequest};

/// Repository trait for attachment persistence.
///
/// This trait is implemented by the db crate to provide actual database operations.
pub trait AttachmentRepository: Send + Sync {
    /// Insert a new attachment.
    fn insert(
        &self,
        attachment: &Attachment,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;

    /// Find attachment by ID.
    fn find_by_id(
        &self,
        id: AttachmentId,
    ) -> impl Future<Output = Result<Option<Attachment>, AttachmentError>> + Send;

    /// List attachments of a parent, newest first.
    fn list_by_parent(
        &self,
        parent_type: ParentType,
        parent_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Attachment>, AttachmentError>> + Send;

    /// Persist a modified attachment.
    ///
    /// The write only applies if the stored version still equals
    /// `attachment.version()`; otherwise it fails with
    /// [`AttachmentError::ConcurrentModification`]. Returns the stored state
    /// with the incremented version.
    fn update(
        &self,
        attachment: &Attachment,
    ) -> impl Future<Output = Result<Attachment, AttachmentError>> + Send;

    /// Delete an attachment.
    ///
    /// Like [`update`](Self::update), the delete only applies if the stored
    /// version still equals `attachment.version()`; otherwise it fails with
    /// [`AttachmentError::ConcurrentModification`].
    fn delete(
        &self,
        attachment: &Attachment,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;
}

/// Existence check for the incidents and comments that own attachments.
pub trait ParentLookup: Send + Sync {
    /// Whether the parent exists.
    fn parent_exists(
        &self,
        parent_type: ParentType,
        parent_id: Uuid,
    ) -> impl Future<Output = Result<bool, AttachmentError>> + Send;
}

/// Attachment service for the upload lifecycle.
pub struct AttachmentService<R: AttachmentRepository, P: ParentLookup> {
    repo: Arc<R>,
    parents: Arc<P>,
    storage: Arc<dyn BlobStorage>,
    sanitizer: Option<Arc<dyn ImageSanitizer>>,
    policy: Arc<AttachmentPolicy>,
}

impl<R: AttachmentRepository, P: ParentLookup> AttachmentService<R, P> {
    /// Create a new attachment service.
    #[must_use]
    pub fn new(
        repo: Arc<R>,
        parents: Arc<P>,
        storage: Arc<dyn BlobStorage>,
        policy: Arc<AttachmentPolicy>,
    ) -> Self {
        Self {
            repo,
            parents,
            storage,
            sanitizer: None,
            policy,
        }
    }

    /// Attach an image sanitizer, used when the policy enables it.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Option<Arc<dyn ImageSanitizer>>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Start an upload: create the pending attachment and issue a slot.
    ///
    /// The row is persisted before the slot is requested. If slot creation
    /// fails, the pending row keeps its placeholder path until the uploader
    /// aborts it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request fails structural validation
    /// - The parent does not exist
    /// - Storage cannot issue a slot
    /// - Database operation fails
    pub async fn start(
        &self,
        input: StartUploadInput,
        actor: UserId,
        cancel: &CancellationToken,
    ) -> Result<StartUploadResult, AttachmentError> {
        self.policy.validate_start(&input)?;

        if !self
            .parents
            .parent_exists(input.parent_type, input.parent_id)
            .await?
        {
            return Err(AttachmentError::ParentNotFound {
                parent_type: input.parent_type,
                parent_id: input.parent_id,
            });
        }
        let path_prefix = input
            .parent_type
            .storage_prefix(input.parent_id)
            .ok_or(AttachmentError::InvalidParentType)?;

        let mut attachment = Attachment::new_pending(
            NewAttachment {
                parent_type: input.parent_type,
                parent_id: input.parent_id,
                file_name: input.file_name,
                content_type: input.content_type,
                uploaded_by: actor,
            },
            &self.policy,
            Utc::now(),
        )?;
        self.repo.insert(&attachment).await?;

        let request = UploadSlotRequest {
            attachment_id: attachment.id(),
            file_name: attachment.file_name().to_string(),
            content_type: attachment.content_type().to_string(),
            path_prefix,
            ttl: self.policy.upload_url_ttl(),
        };
        let slot = match self.storage.create_upload_slot(&request, cancel).await {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(
                    attachment_id = %attachment.id(),
                    provider = self.storage.provider_name(),
                    error = %e,
                    "Upload slot creation failed, pending attachment left without a slot"
                );
                return Err(e.into());
            }
        };

        attachment.assign_storage_path(slot.storage_path.clone())?;
        let attachment = self.repo.update(&attachment).await?;

        tracing::info!(
            attachment_id = %attachment.id(),
            parent_type = %attachment.parent_type(),
            parent_id = %attachment.parent_id(),
            "Upload started"
        );

        Ok(StartUploadResult {
            attachment_id: attachment.id(),
            upload_url: slot.upload_url,
            storage_path: slot.storage_path,
            method: slot.method,
            headers: slot.headers,
            expires_at: slot.expires_at,
        })
    }

    /// Complete an upload after verifying the stored object.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Attachment not found, or not pending
    /// - Nothing was uploaded
    /// - The stored object is empty, too large, or of another content type
    /// - Storage or database operation fails
    pub async fn complete(
        &self,
        id: AttachmentId,
        cancel: &CancellationToken,
    ) -> Result<Attachment, AttachmentError> {
        let mut attachment = self.get(id).await?;
        if attachment.status() != AttachmentStatus::Pending {
            return Err(AttachmentError::InvalidTransition {
                id,
                from: attachment.status(),
                action: "complete",
            });
        }
        if attachment.has_placeholder_path() {
            return Err(AttachmentError::UploadMissing(id));
        }

        let properties = self
            .storage
            .try_get_uploaded(attachment.storage_path(), cancel)
            .await?
            .ok_or(AttachmentError::UploadMissing(id))?;

        if !self.policy.is_size_allowed(properties.length) {
            return Err(AttachmentError::InvalidSize {
                size: properties.length,
                max: self.policy.max_size_bytes(),
            });
        }
        let matches_declared = properties
            .content_type
            .as_deref()
            .is_some_and(|observed| observed.eq_ignore_ascii_case(attachment.content_type()));
        if !matches_declared {
            return Err(AttachmentError::ContentTypeMismatch {
                declared: attachment.content_type().to_string(),
                observed: properties.content_type,
            });
        }

        attachment.complete(properties.length, false, Utc::now())?;
        let mut attachment = self.repo.update(&attachment).await?;
        tracing::info!(
            attachment_id = %id,
            size = properties.length,
            "Upload completed"
        );

        let sanitizer = self
            .sanitizer
            .as_ref()
            .filter(|_| self.policy.sanitize_images());
        if let Some(sanitizer) = sanitizer {
            attachment = self.sanitize(sanitizer.as_ref(), attachment, cancel).await?;
        }

        Ok(attachment)
    }

    /// Best-effort sanitization of a completed attachment.
    async fn sanitize(
        &self,
        sanitizer: &dyn ImageSanitizer,
        attachment: Attachment,
        cancel: &CancellationToken,
    ) -> Result<Attachment, AttachmentError> {
        let outcome = match sanitizer
            .try_sanitize(attachment.storage_path(), attachment.content_type(), cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(SanitizeError::Cancelled) => return Err(AttachmentError::Cancelled),
        };
        if !outcome.changed {
            return Ok(attachment);
        }

        let mut sanitized = attachment.clone();
        sanitized.apply_sanitized(
            outcome.new_length.unwrap_or_else(|| attachment.size().unwrap_or_default()),
            outcome.new_content_type,
        )?;
        match self.repo.update(&sanitized).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                tracing::warn!(
                    attachment_id = %attachment.id(),
                    error = %e,
                    "Failed to record sanitized image size"
                );
                Ok(attachment)
            }
        }
    }

    /// Abort a pending upload, removing the row and then the staged object.
    ///
    /// The row is removed first, guarded by its version, so an upload that
    /// completes concurrently keeps both its row and its object. Storage
    /// cleanup is best-effort: failures are logged.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Attachment not found
    /// - The requester is neither the uploader nor an admin
    /// - Attachment is not pending, or changed since it was read
    /// - Database operation fails
    pub async fn abort(
        &self,
        id: AttachmentId,
        requested_by: UserId,
        requester_is_admin: bool,
        cancel: &CancellationToken,
    ) -> Result<(), AttachmentError> {
        let attachment = self.get(id).await?;

        if attachment.uploaded_by() != requested_by && !requester_is_admin {
            return Err(AttachmentError::forbidden(
                "only the uploader or an admin may abort an upload",
            ));
        }
        if attachment.status() != AttachmentStatus::Pending {
            return Err(AttachmentError::InvalidTransition {
                id,
                from: attachment.status(),
                action: "abort",
            });
        }

        self.repo.delete(&attachment).await?;

        if !attachment.has_placeholder_path() {
            match self.storage.delete(attachment.storage_path(), cancel).await {
                Ok(()) => {}
                Err(StorageError::Cancelled) => return Err(AttachmentError::Cancelled),
                Err(e) => tracing::warn!(
                    attachment_id = %id,
                    storage_path = attachment.storage_path(),
                    error = %e,
                    "Failed to delete staged upload after removing attachment"
                ),
            }
        }

        tracing::info!(attachment_id = %id, "Upload aborted");
        Ok(())
    }

    /// Get attachment by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if attachment not found or database operation fails.
    pub async fn get(&self, id: AttachmentId) -> Result<Attachment, AttachmentError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(AttachmentError::NotFound(id))
    }

    /// List attachments of a parent, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn list_by_parent(
        &self,
        parent_type: ParentType,
        parent_id: Uuid,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        if parent_type == ParentType::None {
            return Err(AttachmentError::InvalidParentType);
        }
        self.repo.list_by_parent(parent_type, parent_id).await
    }

    /// Read the content of a completed attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Attachment not found
    /// - Attachment is blocked (forbidden) or still pending (conflict)
    /// - Storage operation fails
    pub async fn open_content(
        &self,
        id: AttachmentId,
        cancel: &CancellationToken,
    ) -> Result<(Attachment, Bytes), AttachmentError> {
        let attachment = self.get(id).await?;
        match attachment.status() {
            AttachmentStatus::Completed => {}
            AttachmentStatus::Blocked => {
                return Err(AttachmentError::forbidden("attachment is blocked"));
            }
            AttachmentStatus::Pending => {
                return Err(AttachmentError::InvalidTransition {
                    id,
                    from: AttachmentStatus::Pending,
                    action: "download",
                });
            }
        }

        let content = self
            .storage
            .open_read(attachment.storage_path(), cancel)
            .await?;
        Ok((attachment, content))
    }
}
