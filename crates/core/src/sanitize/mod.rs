//! Post-upload image sanitization.
//!
//! Sanitization is best-effort: a corrupt image or a storage hiccup yields a
//! no-op outcome, never an error. Only cancellation is reported.

mod metadata;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use metadata::MetadataStrippingSanitizer;

/// Result of a sanitization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizeOutcome {
    /// Whether the stored object was rewritten.
    pub changed: bool,
    /// Length of the rewritten object.
    pub new_length: Option<u64>,
    /// Content type of the rewritten object.
    pub new_content_type: Option<String>,
}

impl SanitizeOutcome {
    /// Nothing was rewritten.
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Sanitization errors. Only cancellation escapes a sanitizer.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SanitizeError {
    /// The caller cancelled the operation.
    #[error("sanitization cancelled")]
    Cancelled,
}

/// Strips metadata from stored images in place.
#[async_trait]
pub trait ImageSanitizer: Send + Sync {
    /// Sanitize the object at `storage_path` if its type is supported.
    async fn try_sanitize(
        &self,
        storage_path: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<SanitizeOutcome, SanitizeError>;
}
