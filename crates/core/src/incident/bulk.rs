//! Idempotent bulk incident status command.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use incident_shared::types::IncidentId;

use super::error::IncidentError;
use super::types::{BulkStatusRequest, BulkStatusResponse, BulkUpdateOutcome, IncidentStatus};
use crate::idempotency::{IdempotencyError, IdempotencyStore, StoredResponse, validate_key};

/// Most incidents one bulk request may touch.
pub const MAX_BULK_IDS: usize = 500;

/// Repository trait for incident persistence.
pub trait IncidentRepository: Send + Sync {
    /// Set the status of every existing incident in `ids`.
    fn bulk_update_status(
        &self,
        ids: &[IncidentId],
        status: IncidentStatus,
    ) -> impl Future<Output = Result<BulkUpdateOutcome, IncidentError>> + Send;
}

/// Result of executing a bulk status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkStatusOutcome {
    /// Response to send.
    pub response: BulkStatusResponse,
    /// Whether the response was replayed from an earlier request.
    pub replayed: bool,
}

/// Executes bulk status changes at most once per idempotency key.
pub struct BulkStatusService<R: IncidentRepository, S: IdempotencyStore> {
    repo: Arc<R>,
    store: Arc<S>,
    ttl: Duration,
}

impl<R: IncidentRepository, S: IdempotencyStore> BulkStatusService<R, S> {
    /// Create a new service; responses are replayable for `ttl`.
    #[must_use]
    pub fn new(repo: Arc<R>, store: Arc<S>, ttl: Duration) -> Self {
        Self { repo, store, ttl }
    }

    /// Execute the command, or replay the response recorded under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key or request is invalid
    /// - The idempotency store or repository fails
    pub async fn execute(
        &self,
        key: &str,
        mut request: BulkStatusRequest,
    ) -> Result<BulkStatusOutcome, IncidentError> {
        validate_key(key)?;
        validate_request(&mut request)?;
        let payload = serde_json::to_value(&request).map_err(IdempotencyError::from)?;

        if let Some(stored) = self.store.try_get(key, &payload).await? {
            tracing::info!(idempotency_key = key, "Replaying bulk status response");
            return Ok(BulkStatusOutcome {
                response: decode(&stored)?,
                replayed: true,
            });
        }

        let outcome = self
            .repo
            .bulk_update_status(&request.ids, request.new_status)
            .await?;
        tracing::info!(
            idempotency_key = key,
            status = %request.new_status,
            updated = outcome.updated.len(),
            not_found = outcome.not_found.len(),
            "Bulk status applied"
        );

        let response = BulkStatusResponse {
            updated: outcome.updated,
            not_found: outcome.not_found,
            idempotency_key: key.to_string(),
        };
        let json = serde_json::to_string(&response).map_err(IdempotencyError::from)?;
        let stored = self
            .store
            .put_if_absent(key, &payload, StoredResponse::json(json.clone()), self.ttl)
            .await?;

        if stored.json == json {
            Ok(BulkStatusOutcome {
                response,
                replayed: false,
            })
        } else {
            tracing::warn!(
                idempotency_key = key,
                "Another request stored a response first, replaying it"
            );
            Ok(BulkStatusOutcome {
                response: decode(&stored)?,
                replayed: true,
            })
        }
    }
}

/// Reject empty or oversized requests and drop duplicate ids, keeping order.
fn validate_request(request: &mut BulkStatusRequest) -> Result<(), IncidentError> {
    if request.ids.is_empty() {
        return Err(IncidentError::validation("ids must not be empty"));
    }
    let mut seen = std::collections::HashSet::new();
    request.ids.retain(|id| seen.insert(*id));
    if request.ids.len() > MAX_BULK_IDS {
        return Err(IncidentError::validation(format!(
            "at most {MAX_BULK_IDS} ids per request"
        )));
    }
    Ok(())
}

fn decode(stored: &StoredResponse) -> Result<BulkStatusResponse, IncidentError> {
    serde_json::from_str(&stored.json).map_err(|e| IdempotencyError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::InMemoryIdempotencyStore;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock repository that counts executions.
    #[derive(Default)]
    struct MockIncidentRepository {
        existing: Mutex<HashSet<IncidentId>>,
        calls: AtomicUsize,
    }

    impl MockIncidentRepository {
        fn with(ids: &[IncidentId]) -> Self {
            let repo = Self::default();
            repo.existing.lock().unwrap().extend(ids.iter().copied());
            repo
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IncidentRepository for MockIncidentRepository {
        async fn bulk_update_status(
            &self,
            ids: &[IncidentId],
            _status: IncidentStatus,
        ) -> Result<BulkUpdateOutcome, IncidentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let existing = self.existing.lock().unwrap();
            let (updated, not_found) = ids.iter().copied().partition(|id| existing.contains(id));
            Ok(BulkUpdateOutcome { updated, not_found })
        }
    }

    fn service(
        repo: &Arc<MockIncidentRepository>,
    ) -> BulkStatusService<MockIncidentRepository, InMemoryIdempotencyStore> {
        BulkStatusService::new(
            repo.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::hours(24),
        )
    }

    #[tokio::test]
    async fn test_execute_reports_updated_and_missing() {
        let known = IncidentId::new();
        let unknown = IncidentId::new();
        let repo = Arc::new(MockIncidentRepository::with(&[known]));
        let service = service(&repo);

        let outcome = service
            .execute(
                "key-1",
                BulkStatusRequest {
                    ids: vec![known, unknown],
                    new_status: IncidentStatus::Closed,
                },
            )
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.response.updated, vec![known]);
        assert_eq!(outcome.response.not_found, vec![unknown]);
        assert_eq!(outcome.response.idempotency_key, "key-1");
    }

    #[tokio::test]
    async fn test_identical_retry_replays_without_executing() {
        let id = IncidentId::new();
        let repo = Arc::new(MockIncidentRepository::with(&[id]));
        let service = service(&repo);
        let request = BulkStatusRequest {
            ids: vec![id],
            new_status: IncidentStatus::Resolved,
        };

        let first = service.execute("retry", request.clone()).await.unwrap();
        let second = service.execute("retry", request).await.unwrap();

        assert_eq!(repo.calls(), 1);
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.response, second.response);
    }

    #[tokio::test]
    async fn test_reused_key_with_other_payload_replays_first_response() {
        let a = IncidentId::new();
        let b = IncidentId::new();
        let repo = Arc::new(MockIncidentRepository::with(&[a, b]));
        let service = service(&repo);

        let first = service
            .execute(
                "shared",
                BulkStatusRequest {
                    ids: vec![a],
                    new_status: IncidentStatus::Closed,
                },
            )
            .await
            .unwrap();
        let second = service
            .execute(
                "shared",
                BulkStatusRequest {
                    ids: vec![b],
                    new_status: IncidentStatus::Open,
                },
            )
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.response, first.response);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized_requests() {
        let repo = Arc::new(MockIncidentRepository::default());
        let service = service(&repo);

        let empty = service
            .execute(
                "k",
                BulkStatusRequest {
                    ids: vec![],
                    new_status: IncidentStatus::Open,
                },
            )
            .await;
        assert!(matches!(empty, Err(IncidentError::Validation(_))));

        let too_many = service
            .execute(
                "k",
                BulkStatusRequest {
                    ids: (0..=MAX_BULK_IDS).map(|_| IncidentId::new()).collect(),
                    new_status: IncidentStatus::Open,
                },
            )
            .await;
        assert!(matches!(too_many, Err(IncidentError::Validation(_))));
        assert_eq!(repo.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_key() {
        let repo = Arc::new(MockIncidentRepository::default());
        let result = service(&repo)
            .execute(
                "",
                BulkStatusRequest {
                    ids: vec![IncidentId::new()],
                    new_status: IncidentStatus::Open,
                },
            )
            .await;
        assert!(matches!(result, Err(IncidentError::Idempotency(_))));
    }

    #[test]
    fn test_validate_request_drops_duplicates() {
        let id = IncidentId::new();
        let other = IncidentId::new();
        let mut request = BulkStatusRequest {
            ids: vec![id, other, id],
            new_status: IncidentStatus::Open,
        };
        validate_request(&mut request).unwrap();
        assert_eq!(request.ids, vec![id, other]);
    }
}
