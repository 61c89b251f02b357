//! Blob storage port and its backends.
//!
//! The attachment lifecycle talks to storage only through [`BlobStorage`].
//! Two implementations exist, selected at startup by [`StorageBackend`]:
//!
//! - [`OpendalBlobStorage`] - S3-compatible stores (Cloudflare R2, AWS S3,
//!   MinIO), Azure Blob Storage, or the local filesystem via Apache OpenDAL.
//!   Upload slots are presigned PUT URLs.
//! - [`LoopbackBlobStorage`] - development only; upload URLs point back at
//!   this API, which absorbs the bytes into a [`LoopbackStore`].

mod backend;
mod config;
mod error;
mod loopback;
mod object_store;
mod path;
mod service;

pub use backend::StorageBackend;
pub use config::StorageProvider;
pub use error::StorageError;
pub use loopback::{LOOPBACK_UPLOAD_ROUTE, LoopbackBlobStorage, LoopbackStore};
pub use object_store::OpendalBlobStorage;
pub use path::{ALLOWED_PREFIXES, build_storage_path, sanitize_file_name, validate_storage_path};
pub use service::{BlobStorage, ObjectProperties, UploadSlot, UploadSlotRequest, cancellable};
