//! In-process idempotency store.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use super::error::IdempotencyError;
use super::hash::payload_hash;
use super::store::{IdempotencyRecord, IdempotencyStore, StoredResponse, validate_key};

/// [`IdempotencyStore`] over a concurrent map.
///
/// The map entry lock makes check-and-insert atomic per key. Records live
/// only as long as the store.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// [`IdempotencyStore::try_get`] at an explicit time.
    pub fn try_get_at(
        &self,
        key: &str,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredResponse>, IdempotencyError> {
        validate_key(key)?;
        let hash = payload_hash(payload);
        Ok(self
            .records
            .get(key)
            .filter(|record| !record.is_expired_at(now) && record.payload_hash == hash)
            .map(|record| record.response.clone()))
    }

    /// [`IdempotencyStore::put_if_absent`] at an explicit time.
    pub fn put_if_absent_at(
        &self,
        key: &str,
        payload: &Value,
        response: StoredResponse,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<StoredResponse, IdempotencyError> {
        validate_key(key)?;
        let record = IdempotencyRecord {
            key: key.to_string(),
            payload_hash: payload_hash(payload),
            response: response.clone(),
            created_at: now,
            expires_at: now + ttl,
        };

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired_at(now) {
                    existing.insert(record);
                    Ok(response)
                } else {
                    Ok(existing.get().response.clone())
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(response)
            }
        }
    }

    /// Number of stored records, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_get(
        &self,
        key: &str,
        payload: &Value,
    ) -> Result<Option<StoredResponse>, IdempotencyError> {
        self.try_get_at(key, payload, Utc::now())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        payload: &Value,
        response: StoredResponse,
        ttl: Duration,
    ) -> Result<StoredResponse, IdempotencyError> {
        self.put_if_absent_at(key, payload, response, ttl, Utc::now())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, IdempotencyError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired_at(now));
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = InMemoryIdempotencyStore::new();
        let payload = json!({"ids": [1], "newStatus": "closed"});

        assert_eq!(store.try_get("k1", &payload).await.unwrap(), None);

        let stored = store
            .put_if_absent("k1", &payload, StoredResponse::json(r#"{"a":1}"#), Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(stored.json, r#"{"a":1}"#);

        let hit = store.try_get("k1", &payload).await.unwrap().unwrap();
        assert_eq!(hit, stored);
        assert_eq!(hit.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_different_payload_misses_but_cannot_overwrite() {
        let store = InMemoryIdempotencyStore::new();
        let first = json!({"ids": [1]});
        let second = json!({"ids": [2]});
        store
            .put_if_absent("k", &first, StoredResponse::json("first"), Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.try_get("k", &second).await.unwrap(), None);
        let stored = store
            .put_if_absent("k", &second, StoredResponse::json("second"), Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stored.json, "first");
    }

    #[test]
    fn test_expired_record_is_replaced() {
        let store = InMemoryIdempotencyStore::new();
        let payload = json!({});
        let now = Utc::now();
        store
            .put_if_absent_at("k", &payload, StoredResponse::json("old"), Duration::minutes(1), now)
            .unwrap();

        let later = now + Duration::minutes(2);
        assert_eq!(store.try_get_at("k", &payload, later).unwrap(), None);
        let stored = store
            .put_if_absent_at("k", &payload, StoredResponse::json("new"), Duration::minutes(1), later)
            .unwrap();
        assert_eq!(stored.json, "new");
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let store = InMemoryIdempotencyStore::new();
        let now = Utc::now();
        store
            .put_if_absent_at("old", &json!({}), StoredResponse::json("{}"), Duration::minutes(1), now)
            .unwrap();
        store
            .put_if_absent_at("fresh", &json!({}), StoredResponse::json("{}"), Duration::hours(1), now)
            .unwrap();

        let pruned = store.prune_expired(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let store = InMemoryIdempotencyStore::new();
        let err = store.try_get("", &json!({})).await.unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_concurrent_puts_agree_on_first_writer() {
        let store = std::sync::Arc::new(InMemoryIdempotencyStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put_if_absent(
                        "race",
                        &json!({"n": i}),
                        StoredResponse::json(i.to_string()),
                        Duration::hours(1),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(store.len(), 1);
    }
}
