//! Incident command error types.

use incident_shared::AppError;
use thiserror::Error;

use crate::idempotency::IdempotencyError;

/// Incident command errors.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// Request failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Idempotency store failed or rejected the key.
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl IncidentError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

impl From<IncidentError> for AppError {
    fn from(err: IncidentError) -> Self {
        match err {
            IncidentError::Validation(msg) => Self::Validation(msg),
            IncidentError::Idempotency(inner) => inner.into(),
            IncidentError::Repository(msg) => Self::Database(msg),
        }
    }
}
