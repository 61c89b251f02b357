//! The blob storage port.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use incident_shared::types::AttachmentId;
use tokio_util::sync::CancellationToken;

use super::error::StorageError;

/// Request for a time-boxed, write-capable upload slot.
#[derive(Debug, Clone)]
pub struct UploadSlotRequest {
    /// Attachment the slot is issued for.
    pub attachment_id: AttachmentId,
    /// Client-supplied file name (sanitized before use).
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Path prefix, e.g. `incidents/{incident_id}`.
    pub path_prefix: String,
    /// How long the slot accepts uploads.
    pub ttl: Duration,
}

/// An issued upload slot.
#[derive(Debug, Clone)]
pub struct UploadSlot {
    /// Storage path the upload lands on.
    pub storage_path: String,
    /// URL the client uploads to.
    pub upload_url: String,
    /// When the slot stops accepting uploads.
    pub expires_at: DateTime<Utc>,
    /// HTTP method to use.
    pub method: String,
    /// Headers the client must send with the upload.
    pub headers: HashMap<String, String>,
}

/// Properties of a stored object as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectProperties {
    /// Object length in bytes.
    pub length: u64,
    /// Content type recorded by the backend, if any.
    pub content_type: Option<String>,
}

/// Object store capability used by the attachment lifecycle.
///
/// Every call takes a cancellation token; implementations return
/// [`StorageError::Cancelled`] once it fires.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Backend name for logs.
    fn provider_name(&self) -> &'static str;

    /// Issue an upload slot. Fails with `AlreadyExists` if an object is
    /// already stored at the computed path.
    async fn create_upload_slot(
        &self,
        request: &UploadSlotRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadSlot, StorageError>;

    /// Probe for an uploaded object. `Ok(None)` means nothing is there yet.
    async fn try_get_uploaded(
        &self,
        storage_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ObjectProperties>, StorageError>;

    /// Read a stored object. Fails with `NotFound` if absent.
    async fn open_read(
        &self,
        storage_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, StorageError>;

    /// Delete a stored object. Deleting a missing object succeeds.
    async fn delete(&self, storage_path: &str, cancel: &CancellationToken)
    -> Result<(), StorageError>;

    /// Replace a stored object in full.
    async fn overwrite(
        &self,
        storage_path: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;
}

/// Race a storage future against a cancellation token.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StorageError::Cancelled),
        result = fut => result,
    }
}

/// Compute a slot expiry from a TTL.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, StorageError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| StorageError::configuration("upload slot ttl is out of range"))
}
