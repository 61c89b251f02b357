//! Incident repository for database operations.

use std::collections::HashSet;

use chrono::Utc;
use incident_core::incident::{
    BulkUpdateOutcome, IncidentError, IncidentRepository as IncidentRepoTrait, IncidentStatus,
};
use incident_shared::types::{CommentId, IncidentId, UserId};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{comments, incidents};

/// Incident repository implementation.
#[derive(Debug, Clone)]
pub struct IncidentRepository {
    db: DatabaseConnection,
}

impl IncidentRepository {
    /// Create a new incident repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create an open incident.
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        reported_by: UserId,
    ) -> Result<IncidentId, IncidentError> {
        let now = Utc::now();
        let model = incidents::ActiveModel {
            id: Set(Uuid::now_v7()),
            title: Set(title.to_string()),
            description: Set(description.to_string()),
            status: Set(IncidentStatus::Open.as_str().to_string()),
            reported_by: Set(reported_by.into_inner()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| IncidentError::repository(e.to_string()))?;

        Ok(IncidentId::from_uuid(model.id))
    }

    /// Add a comment to an incident.
    pub async fn add_comment(
        &self,
        incident_id: IncidentId,
        author: UserId,
        body: &str,
    ) -> Result<CommentId, IncidentError> {
        let model = comments::ActiveModel {
            id: Set(Uuid::now_v7()),
            incident_id: Set(incident_id.into_inner()),
            author_id: Set(author.into_inner()),
            body: Set(body.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| IncidentError::repository(e.to_string()))?;

        Ok(CommentId::from_uuid(model.id))
    }

    /// Current status of an incident.
    pub async fn find_status(
        &self,
        id: IncidentId,
    ) -> Result<Option<IncidentStatus>, IncidentError> {
        let model = incidents::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(|e| IncidentError::repository(e.to_string()))?;

        model
            .map(|m| {
                IncidentStatus::parse(&m.status).ok_or_else(|| {
                    IncidentError::repository(format!("unknown incident status: {}", m.status))
                })
            })
            .transpose()
    }
}

impl IncidentRepoTrait for IncidentRepository {
    async fn bulk_update_status(
        &self,
        ids: &[IncidentId],
        status: IncidentStatus,
    ) -> Result<BulkUpdateOutcome, IncidentError> {
        let requested: Vec<Uuid> = ids.iter().map(|id| id.into_inner()).collect();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| IncidentError::repository(e.to_string()))?;

        let existing: Vec<Uuid> = incidents::Entity::find()
            .select_only()
            .column(incidents::Column::Id)
            .filter(incidents::Column::Id.is_in(requested))
            .lock_exclusive()
            .into_tuple()
            .all(&txn)
            .await
            .map_err(|e| IncidentError::repository(e.to_string()))?;

        if !existing.is_empty() {
            incidents::Entity::update_many()
                .col_expr(incidents::Column::Status, Expr::value(status.as_str()))
                .col_expr(incidents::Column::UpdatedAt, Expr::current_timestamp().into())
                .filter(incidents::Column::Id.is_in(existing.clone()))
                .exec(&txn)
                .await
                .map_err(|e| IncidentError::repository(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| IncidentError::repository(e.to_string()))?;

        let existing: HashSet<Uuid> = existing.into_iter().collect();
        let (updated, not_found) = ids
            .iter()
            .copied()
            .partition(|id| existing.contains(&id.into_inner()));

        tracing::debug!(
            status = %status,
            updated = existing.len(),
            "bulk incident status applied"
        );

        Ok(BulkUpdateOutcome { updated, not_found })
    }
}
