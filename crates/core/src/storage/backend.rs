//! Backend selection at startup.

use std::sync::Arc;

use super::config::StorageProvider;
use super::error::StorageError;
use super::loopback::{LoopbackBlobStorage, LoopbackStore};
use super::object_store::OpendalBlobStorage;
use super::service::BlobStorage;

/// The configured storage backend.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Object store through OpenDAL.
    Opendal(OpendalBlobStorage),
    /// In-process loopback store.
    Loopback(LoopbackBlobStorage),
}

impl StorageBackend {
    /// Build the backend named by the provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be initialized.
    pub fn from_provider(provider: &StorageProvider) -> Result<Self, StorageError> {
        match provider {
            StorageProvider::Loopback { public_base_url } => Ok(Self::Loopback(
                LoopbackBlobStorage::new(LoopbackStore::new(), public_base_url.clone()),
            )),
            other => OpendalBlobStorage::from_provider(other).map(Self::Opendal),
        }
    }

    /// The loopback store, if this is the loopback backend.
    #[must_use]
    pub fn loopback(&self) -> Option<&LoopbackStore> {
        match self {
            Self::Loopback(storage) => Some(storage.store()),
            Self::Opendal(_) => None,
        }
    }

    /// Erase into the shared port.
    #[must_use]
    pub fn into_shared(self) -> Arc<dyn BlobStorage> {
        match self {
            Self::Opendal(storage) => Arc::new(storage),
            Self::Loopback(storage) => Arc::new(storage),
        }
    }
}
