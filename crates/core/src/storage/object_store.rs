//! Production blob storage over Apache OpenDAL.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use opendal::{ErrorKind, Operator, services};
use tokio_util::sync::CancellationToken;

use super::config::StorageProvider;
use super::error::StorageError;
use super::path::{build_storage_path, validate_storage_path};
use super::service::{
    BlobStorage, ObjectProperties, UploadSlot, UploadSlotRequest, cancellable, expiry_after,
};

/// [`BlobStorage`] backed by an OpenDAL operator.
///
/// Upload slots are presigned PUT URLs, so the backend must support
/// presigning (S3, Azure Blob). The local filesystem backend can read,
/// write and delete but cannot issue slots.
#[derive(Debug, Clone)]
pub struct OpendalBlobStorage {
    operator: Operator,
    provider: &'static str,
}

impl OpendalBlobStorage {
    /// Build from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be initialized, or if the
    /// provider is the loopback backend.
    pub fn from_provider(provider: &StorageProvider) -> Result<Self, StorageError> {
        let operator = match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);
                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::AzureBlob {
                account,
                access_key,
                container,
            } => {
                let builder = services::Azblob::default()
                    .account_name(account)
                    .account_key(access_key)
                    .container(container);
                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::LocalFs { root } => {
                let root = root
                    .to_str()
                    .ok_or_else(|| StorageError::configuration("storage.root is not valid UTF-8"))?;
                Operator::new(services::Fs::default().root(root))
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::Loopback { .. } => {
                return Err(StorageError::configuration(
                    "loopback storage is not served by OpenDAL",
                ));
            }
        };

        Ok(Self::from_operator(operator, provider.name()))
    }

    /// Wrap an existing operator.
    #[must_use]
    pub fn from_operator(operator: Operator, provider: &'static str) -> Self {
        Self { operator, provider }
    }

    async fn stat(&self, storage_path: &str) -> Result<Option<ObjectProperties>, StorageError> {
        match self.operator.stat(storage_path).await {
            Ok(meta) => Ok(Some(ObjectProperties {
                length: meta.content_length(),
                content_type: meta.content_type().map(String::from),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStorage for OpendalBlobStorage {
    fn provider_name(&self) -> &'static str {
        self.provider
    }

    async fn create_upload_slot(
        &self,
        request: &UploadSlotRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadSlot, StorageError> {
        let storage_path = build_storage_path(
            &request.path_prefix,
            &request.attachment_id.to_string(),
            &request.file_name,
        )?;

        cancellable(cancel, async {
            if self.stat(&storage_path).await?.is_some() {
                return Err(StorageError::AlreadyExists {
                    path: storage_path.clone(),
                });
            }

            let expires_at = expiry_after(Utc::now(), request.ttl)?;
            let presigned = self
                .operator
                .presign_write(&storage_path, request.ttl)
                .await?;

            let mut headers: HashMap<String, String> = presigned
                .header()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            headers.insert("Content-Type".to_string(), request.content_type.clone());

            Ok(UploadSlot {
                upload_url: presigned.uri().to_string(),
                method: presigned.method().to_string(),
                storage_path: storage_path.clone(),
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
        cancellable(cancel, self.stat(storage_path)).await
    }

    async fn open_read(
        &self,
        storage_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, StorageError> {
        validate_storage_path(storage_path)?;
        cancellable(cancel, async {
            match self.operator.read(storage_path).await {
                Ok(buffer) => Ok(buffer.to_bytes()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(StorageError::not_found(storage_path))
                }
                Err(e) => Err(e.into()),
            }
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
            match self.operator.delete(storage_path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
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
            self.operator
                .write_with(storage_path, content)
                .content_type(content_type)
                .await?;
            Ok(())
        })
        .await
    }
}
