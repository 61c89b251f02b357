//! Storage error types.

use incident_shared::AppError;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage path failed validation.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    /// An object already exists where a new upload slot was requested.
    #[error("object already exists: {path}")]
    AlreadyExists {
        /// Conflicting storage path.
        path: String,
    },

    /// File not found in storage.
    #[error("file not found: {path}")]
    NotFound {
        /// Storage path that was not found.
        path: String,
    },

    /// No upload slot was issued for the path.
    #[error("no upload slot issued for {path}")]
    SlotNotFound {
        /// Storage path of the upload.
        path: String,
    },

    /// The upload slot for the path has expired.
    #[error("upload slot expired for {path}")]
    SlotExpired {
        /// Storage path of the upload.
        path: String,
    },

    /// Presign operation not supported by provider.
    #[error("presign operation not supported by storage provider")]
    PresignNotSupported,

    /// Storage provider configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Backend operation error.
    #[error("storage operation failed: {0}")]
    Operation(String),

    /// The caller cancelled the operation.
    #[error("storage operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Create an invalid path error.
    #[must_use]
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                path: err.to_string(),
            },
            opendal::ErrorKind::Unsupported => Self::PresignNotSupported,
            _ => Self::Operation(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(_) => Self::Validation(err.to_string()),
            StorageError::AlreadyExists { .. } => Self::Conflict(err.to_string()),
            StorageError::NotFound { .. } | StorageError::SlotNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            StorageError::SlotExpired { .. } => Self::Forbidden(err.to_string()),
            StorageError::Cancelled => Self::ServiceUnavailable(err.to_string()),
            StorageError::PresignNotSupported
            | StorageError::Configuration(_)
            | StorageError::Operation(_) => Self::ExternalService(err.to_string()),
        }
    }
}
