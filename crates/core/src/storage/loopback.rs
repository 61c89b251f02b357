//! Loopback storage: uploads are absorbed by the API process itself.
//!
//! For development and tests only. The backing [`LoopbackStore`] is an
//! explicit, cloneable handle; every clone sees the same objects. It lives as
//! long as the process (or test) that created it, and [`LoopbackStore::reset`]
//! clears it between test runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use super::path::{build_storage_path, validate_storage_path};
use super::service::{
    BlobStorage, ObjectProperties, UploadSlot, UploadSlotRequest, cancellable, expiry_after,
};

/// Route under which the API accepts loopback uploads.
pub const LOOPBACK_UPLOAD_ROUTE: &str = "/api/v1/dev-uploads";

/// Content type recorded when an upload carries none.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
struct StoredObject {
    content: Bytes,
    content_type: String,
}

#[derive(Debug, Clone, Copy)]
struct SlotGrant {
    expires_at: DateTime<Utc>,
}

/// Process-scoped in-memory object store.
#[derive(Debug, Clone, Default)]
pub struct LoopbackStore {
    objects: Arc<DashMap<String, StoredObject>>,
    slots: Arc<DashMap<String, SlotGrant>>,
}

impl LoopbackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload slot for `path` until `expires_at`.
    pub fn grant_slot(&self, path: &str, expires_at: DateTime<Utc>) {
        self.slots.insert(path.to_string(), SlotGrant { expires_at });
    }

    /// Accept uploaded bytes for a previously granted slot.
    ///
    /// A live slot may be written more than once until it expires.
    pub fn absorb_upload(
        &self,
        path: &str,
        content: Bytes,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        validate_storage_path(path)?;

        let grant = self
            .slots
            .get(path)
            .map(|grant| *grant)
            .ok_or_else(|| StorageError::SlotNotFound {
                path: path.to_string(),
            })?;
        if grant.expires_at <= now {
            return Err(StorageError::SlotExpired {
                path: path.to_string(),
            });
        }

        self.put(path, content, content_type.unwrap_or(DEFAULT_CONTENT_TYPE));
        Ok(())
    }

    /// Store an object, replacing any previous content.
    pub fn put(&self, path: &str, content: Bytes, content_type: &str) {
        self.objects.insert(
            path.to_string(),
            StoredObject {
                content,
                content_type: content_type.to_string(),
            },
        );
    }

    /// Properties of a stored object.
    #[must_use]
    pub fn properties(&self, path: &str) -> Option<ObjectProperties> {
        self.objects.get(path).map(|object| ObjectProperties {
            length: object.content.len() as u64,
            content_type: Some(object.content_type.clone()),
        })
    }

    /// Content of a stored object.
    #[must_use]
    pub fn content(&self, path: &str) -> Option<Bytes> {
        self.objects.get(path).map(|object| object.content.clone())
    }

    /// Remove an object and its slot.
    pub fn remove(&self, path: &str) {
        self.objects.remove(path);
        self.slots.remove(path);
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no objects are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drop all objects and slots.
    pub fn reset(&self) {
        self.objects.clear();
        self.slots.clear();
    }
}

/// [`BlobStorage`] that hands out upload URLs pointing back at this API.
#[derive(Debug, Clone)]
pub struct LoopbackBlobStorage {
    store: LoopbackStore,
    public_base_url: String,
}

impl LoopbackBlobStorage {
    /// Create over a shared store.
    #[must_use]
    pub fn new(store: LoopbackStore, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &LoopbackStore {
        &self.store
    }
}

#[async_trait]
impl BlobStorage for LoopbackBlobStorage {
    fn provider_name(&self) -> &'static str {
        "loopback"
    }

    async fn create_upload_slot(
        &self,
        request: &UploadSlotRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadSlot, StorageError> {
        cancellable(cancel, async {
            let storage_path = build_storage_path(
                &request.path_prefix,
                &request.attachment_id.to_string(),
                &request.file_name,
            )?;
            if self.store.properties(&storage_path).is_some() {
                return Err(StorageError::AlreadyExists { path: storage_path });
            }

            let expires_at = expiry_after(Utc::now(), request.ttl)?;
            self.store.grant_slot(&storage_path, expires_at);

            let mut headers = HashMap::new();
            headers.insert("Content-Type".to_string(), request.content_type.clone());

            Ok(UploadSlot {
                upload_url: format!(
                    "{}{LOOPBACK_UPLOAD_ROUTE}/{storage_path}",
                    self.public_base_url
                ),
                method: "PUT".to_string(),
                storage_path,
                expires_at,
                headers,
            })
        })
        .await
    }

    async fn try_get_uploaded(
        &self,
        storage_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ObjectProperties>, StorageError> {
        validate_storage_path(storage_path)?;
        cancellable(cancel, async { Ok(self.store.properties(storage_path)) }).await
    }

    async fn open_read(
        &self,
        storage_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, StorageError> {
        validate_storage_path(storage_path)?;
        cancellable(cancel, async {
            self.store
                .content(storage_path)
                .ok_or_else(|| StorageError::not_found(storage_path))
        })
        .await
    }

    async fn delete(
        &self,
        storage_path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        validate_storage_path(storage_path)?;
        cancellable(cancel, async {
            self.store.remove(storage_path);
            Ok(())
        })
        .await
    }

    async fn overwrite(
        &self,
        storage_path: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        validate_storage_path(storage_path)?;
        cancellable(cancel, async {
            self.store.put(storage_path, content, content_type);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use incident_shared::types::AttachmentId;
    use std::time::Duration;

    fn slot_request(prefix: &str) -> UploadSlotRequest {
        UploadSlotRequest {
            attachment_id: AttachmentId::new(),
            file_name: "scene photo.png".to_string(),
            content_type: "image/png".to_string(),
            path_prefix: prefix.to_string(),
            ttl: Duration::from_secs(900),
        }
    }

    #[tokio::test]
    async fn test_create_upload_slot_points_back_at_api() {
        let storage = LoopbackBlobStorage::new(LoopbackStore::new(), "http://localhost:8080/");
        let request = slot_request("incidents/42");

        let slot = storage
            .create_upload_slot(&request, &CancellationToken::new())
            .await
            .unwrap();

        let expected_path = format!("incidents/42/{}/scene_photo.png", request.attachment_id);
        assert_eq!(slot.storage_path, expected_path);
        assert_eq!(
            slot.upload_url,
            format!("http://localhost:8080/api/v1/dev-uploads/{expected_path}")
        );
        assert_eq!(slot.method, "PUT");
        assert_eq!(slot.headers.get("Content-Type").unwrap(), "image/png");
        assert!(slot.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_create_upload_slot_rejects_existing_object() {
        let store = LoopbackStore::new();
        let storage = LoopbackBlobStorage::new(store.clone(), "http://localhost:8080");
        let request = slot_request("comments/7");
        let path = format!("comments/7/{}/scene_photo.png", request.attachment_id);
        store.put(&path, Bytes::from_static(b"x"), "image/png");

        let err = storage
            .create_upload_slot(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_upload_slot_rejects_unknown_prefix() {
        let storage = LoopbackBlobStorage::new(LoopbackStore::new(), "http://localhost:8080");
        let err = storage
            .create_upload_slot(&slot_request("users/1"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_absorbed_upload_is_visible_to_probe() {
        let store = LoopbackStore::new();
        let storage = LoopbackBlobStorage::new(store.clone(), "http://localhost:8080");
        let cancel = CancellationToken::new();
        let slot = storage
            .create_upload_slot(&slot_request("incidents/1"), &cancel)
            .await
            .unwrap();

        assert_eq!(
            storage.try_get_uploaded(&slot.storage_path, &cancel).await.unwrap(),
            None
        );

        store
            .absorb_upload(
                &slot.storage_path,
                Bytes::from_static(b"12345"),
                Some("image/png"),
                Utc::now(),
            )
            .unwrap();

        let props = storage
            .try_get_uploaded(&slot.storage_path, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(props.length, 5);
        assert_eq!(props.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_absorb_upload_requires_slot() {
        let store = LoopbackStore::new();
        let err = store
            .absorb_upload("incidents/1/2/a.png", Bytes::new(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, StorageError::SlotNotFound { .. }));
    }

    #[test]
    fn test_absorb_upload_rejects_expired_slot() {
        let store = LoopbackStore::new();
        let now = Utc::now();
        store.grant_slot("incidents/1/2/a.png", now - ChronoDuration::seconds(1));

        let err = store
            .absorb_upload("incidents/1/2/a.png", Bytes::new(), None, now)
            .unwrap_err();
        assert!(matches!(err, StorageError::SlotExpired { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_absorb_upload_defaults_content_type() {
        let store = LoopbackStore::new();
        let now = Utc::now();
        store.grant_slot("incidents/1/2/a.bin", now + ChronoDuration::minutes(5));
        store
            .absorb_upload("incidents/1/2/a.bin", Bytes::from_static(b"x"), None, now)
            .unwrap();

        let props = store.properties("incidents/1/2/a.bin").unwrap();
        assert_eq!(props.content_type.as_deref(), Some(DEFAULT_CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_delete_removes_object_and_slot() {
        let store = LoopbackStore::new();
        let storage = LoopbackBlobStorage::new(store.clone(), "http://localhost:8080");
        let cancel = CancellationToken::new();
        let now = Utc::now();
        let path = "incidents/1/2/a.png";
        store.grant_slot(path, now + ChronoDuration::minutes(5));
        store
            .absorb_upload(path, Bytes::from_static(b"x"), Some("image/png"), now)
            .unwrap();

        storage.delete(path, &cancel).await.unwrap();
        storage.delete(path, &cancel).await.unwrap();

        assert!(store.is_empty());
        let err = store
            .absorb_upload(path, Bytes::from_static(b"x"), None, now)
            .unwrap_err();
        assert!(matches!(err, StorageError::SlotNotFound { .. }));
    }

    #[test]
    fn test_clones_share_state_and_reset_clears() {
        let store = LoopbackStore::new();
        let clone = store.clone();
        clone.put("incidents/1/2/a.png", Bytes::from_static(b"x"), "image/png");
        assert_eq!(store.len(), 1);

        store.reset();
        assert!(clone.is_empty());
    }
}
