//! Postgres-backed idempotency store.
//!
//! Uniqueness of `key` is the primary key, so two concurrent first writes
//! for the same key serialize in the database and the loser reads back the
//! winner's response.

use chrono::{DateTime, Duration, Utc};
use incident_core::idempotency::{
    IdempotencyError, IdempotencyStore, StoredResponse, payload_hash,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    Statement,
};
use serde_json::Value;

use crate::entities::idempotency_records;

/// Inserts a record, replacing an existing one only once it has expired.
const UPSERT_SQL: &str = r"
INSERT INTO idempotency_records
    (key, payload_hash, response_json, response_content_type, created_at, expires_at)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (key) DO UPDATE SET
    payload_hash = EXCLUDED.payload_hash,
    response_json = EXCLUDED.response_json,
    response_content_type = EXCLUDED.response_content_type,
    created_at = EXCLUDED.created_at,
    expires_at = EXCLUDED.expires_at
WHERE idempotency_records.expires_at < EXCLUDED.created_at
";

/// Idempotency repository implementation.
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    db: DatabaseConnection,
}

impl IdempotencyRepository {
    /// Create a new idempotency repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl IdempotencyStore for IdempotencyRepository {
    async fn try_get(
        &self,
        key: &str,
        payload: &Value,
    ) -> Result<Option<StoredResponse>, IdempotencyError> {
        let hash = payload_hash(payload);
        let now = Utc::now();

        let record = idempotency_records::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(db_error)?;

        Ok(record
            .filter(|r| r.payload_hash == hash && now <= r.expires_at.with_timezone(&Utc))
            .map(to_response))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        payload: &Value,
        response: StoredResponse,
        ttl: Duration,
    ) -> Result<StoredResponse, IdempotencyError> {
        let now = Utc::now();
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            UPSERT_SQL,
            [
                key.into(),
                payload_hash(payload).into(),
                response.json.into(),
                response.content_type.into(),
                now.into(),
                (now + ttl).into(),
            ],
        );
        self.db.execute(statement).await.map_err(db_error)?;

        let stored = idempotency_records::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(db_error)?
            .ok_or_else(|| IdempotencyError::repository(format!("record vanished: {key}")))?;

        Ok(to_response(stored))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, IdempotencyError> {
        let result = idempotency_records::Entity::delete_many()
            .filter(idempotency_records::Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn db_error(err: DbErr) -> IdempotencyError {
    IdempotencyError::repository(err.to_string())
}

fn to_response(model: idempotency_records::Model) -> StoredResponse {
    StoredResponse {
        json: model.response_json,
        content_type: model.response_content_type,
    }
}
