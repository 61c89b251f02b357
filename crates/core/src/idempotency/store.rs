//! Idempotency store contract.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::error::IdempotencyError;

/// Longest accepted idempotency key, in characters.
pub const MAX_KEY_CHARS: usize = 256;

/// A frozen response to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// Serialized response body.
    pub json: String,
    /// Response content type.
    pub content_type: String,
}

impl StoredResponse {
    /// A JSON response body.
    #[must_use]
    pub fn json(json: impl Into<String>) -> Self {
        Self {
            json: json.into(),
            content_type: "application/json".to_string(),
        }
    }
}

/// A stored idempotency record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    /// Client-supplied key.
    pub key: String,
    /// Hash of the request payload that produced the response.
    pub payload_hash: String,
    /// Response to replay.
    pub response: StoredResponse,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// When the record stops being replayed.
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Whether the record is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// First-write-wins response cache keyed by client idempotency keys.
///
/// Uniqueness of `key` is enforced by the backing store, so concurrent
/// identical retries resolve to whichever write lands first.
pub trait IdempotencyStore: Send + Sync {
    /// Cached response for `key` if it exists, has not expired, and was
    /// produced by the same payload.
    fn try_get(
        &self,
        key: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<Option<StoredResponse>, IdempotencyError>> + Send;

    /// Store `response` under `key` unless an unexpired record exists.
    ///
    /// Returns the response now stored for `key`: the given one if this call
    /// wrote it, otherwise the existing one, whatever payload produced it.
    fn put_if_absent(
        &self,
        key: &str,
        payload: &Value,
        response: StoredResponse,
        ttl: Duration,
    ) -> impl Future<Output = Result<StoredResponse, IdempotencyError>> + Send;

    /// Delete records that expired before `now`. Returns how many were removed.
    fn prune_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, IdempotencyError>> + Send;
}

/// Validate a client-supplied idempotency key.
///
/// # Errors
///
/// Returns `InvalidKey` for empty keys, keys over [`MAX_KEY_CHARS`], and keys
/// with control characters.
pub fn validate_key(key: &str) -> Result<(), IdempotencyError> {
    if key.trim().is_empty() {
        return Err(IdempotencyError::InvalidKey("key is empty".to_string()));
    }
    if key.chars().count() > MAX_KEY_CHARS {
        return Err(IdempotencyError::InvalidKey(format!(
            "key exceeds {MAX_KEY_CHARS} characters"
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(IdempotencyError::InvalidKey(
            "key contains control characters".to_string(),
        ));
    }
    Ok(())
}
