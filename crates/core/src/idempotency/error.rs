//! Idempotency error types.

use incident_shared::AppError;
use thiserror::Error;

/// Idempotency store errors.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The client-supplied key is empty, too long, or contains control characters.
    #[error("invalid idempotency key: {0}")]
    InvalidKey(String),

    /// Payload or response could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backing store failed.
    #[error("idempotency store error: {0}")]
    Repository(String),
}

impl IdempotencyError {
    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

impl From<serde_json::Error> for IdempotencyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<IdempotencyError> for AppError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::InvalidKey(_) => Self::Validation(err.to_string()),
            IdempotencyError::Serialization(msg) => Self::Internal(msg),
            IdempotencyError::Repository(msg) => Self::Database(msg),
        }
    }
}
