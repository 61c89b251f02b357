//! Attachment repository for database operations.
//!
//! Implements attachment persistence using SeaORM, with optimistic
//! concurrency on the `version` column.

use chrono::Utc;
use incident_core::attachment::{
    Attachment, AttachmentError, AttachmentRepository as AttachmentRepoTrait, AttachmentSnapshot,
    AttachmentStatus, ParentType,
};
use incident_shared::types::{AttachmentId, UserId};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::attachments;

/// Attachment repository implementation.
#[derive(Debug, Clone)]
pub struct AttachmentRepository {
    db: DatabaseConnection,
}

impl AttachmentRepository {
    /// Create a new attachment repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Classify a version-guarded write that matched no row.
    async fn stale_write(&self, id: AttachmentId) -> AttachmentError {
        match attachments::Entity::find_by_id(id.into_inner())
            .count(&self.db)
            .await
        {
            Ok(0) => AttachmentError::NotFound(id),
            Ok(_) => AttachmentError::ConcurrentModification(id),
            Err(e) => db_error(e),
        }
    }
}

impl AttachmentRepoTrait for AttachmentRepository {
    async fn insert(&self, attachment: &Attachment) -> Result<(), AttachmentError> {
        to_active_model(&attachment.to_snapshot())?
            .insert(&self.db)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: AttachmentId) -> Result<Option<Attachment>, AttachmentError> {
        let model = attachments::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_error)?;

        model.map(to_domain).transpose()
    }

    async fn list_by_parent(
        &self,
        parent_type: ParentType,
        parent_id: Uuid,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let models = attachments::Entity::find()
            .filter(attachments::Column::ParentType.eq(parent_type.as_str()))
            .filter(attachments::Column::ParentId.eq(parent_id))
            .order_by_desc(attachments::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_error)?;

        models.into_iter().map(to_domain).collect()
    }

    async fn update(&self, attachment: &Attachment) -> Result<Attachment, AttachmentError> {
        let snapshot = attachment.to_snapshot();
        let mut active_model = to_active_model(&snapshot)?;
        active_model.id = NotSet;
        active_model.created_at = NotSet;
        active_model.version = Set(snapshot.version + 1);

        let result = attachments::Entity::update_many()
            .set(active_model)
            .filter(attachments::Column::Id.eq(snapshot.id.into_inner()))
            .filter(attachments::Column::Version.eq(snapshot.version))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        if result.rows_affected == 0 {
            return Err(self.stale_write(snapshot.id).await);
        }

        Ok(attachment.with_next_version())
    }

    async fn delete(&self, attachment: &Attachment) -> Result<(), AttachmentError> {
        let result = attachments::Entity::delete_many()
            .filter(attachments::Column::Id.eq(attachment.id().into_inner()))
            .filter(attachments::Column::Version.eq(attachment.version()))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        if result.rows_affected == 0 {
            return Err(self.stale_write(attachment.id()).await);
        }
        Ok(())
    }
}

#[allow(clippy::needless_pass_by_value)]
fn db_error(err: DbErr) -> AttachmentError {
    AttachmentError::repository(err.to_string())
}

fn to_active_model(
    snapshot: &AttachmentSnapshot,
) -> Result<attachments::ActiveModel, AttachmentError> {
    let size = snapshot
        .size
        .map(i64::try_from)
        .transpose()
        .map_err(|_| AttachmentError::repository("attachment size out of range"))?;

    Ok(attachments::ActiveModel {
        id: Set(snapshot.id.into_inner()),
        parent_type: Set(snapshot.parent_type.as_str().to_string()),
        parent_id: Set(snapshot.parent_id),
        file_name: Set(snapshot.file_name.clone()),
        content_type: Set(snapshot.content_type.clone()),
        size: Set(size),
        status: Set(snapshot.status.as_str().to_string()),
        storage_path: Set(snapshot.storage_path.clone()),
        uploaded_by: Set(snapshot.uploaded_by.into_inner()),
        created_at: Set(snapshot.created_at.into()),
        completed_at: Set(snapshot.completed_at.map(Into::into)),
        has_thumbnail: Set(snapshot.has_thumbnail),
        version: Set(snapshot.version),
    })
}

/// Convert a database row to the domain aggregate.
fn to_domain(model: attachments::Model) -> Result<Attachment, AttachmentError> {
    let parent_type = ParentType::parse(&model.parent_type).ok_or_else(|| {
        AttachmentError::repository(format!("unknown parent type: {}", model.parent_type))
    })?;
    let status = AttachmentStatus::parse(&model.status)
        .ok_or_else(|| AttachmentError::repository(format!("unknown status: {}", model.status)))?;
    let size = model
        .size
        .map(u64::try_from)
        .transpose()
        .map_err(|_| AttachmentError::repository("negative attachment size"))?;

    Attachment::from_snapshot(AttachmentSnapshot {
        id: AttachmentId::from_uuid(model.id),
        parent_type,
        parent_id: model.parent_id,
        file_name: model.file_name,
        content_type: model.content_type,
        size,
        status,
        storage_path: model.storage_path,
        uploaded_by: UserId::from_uuid(model.uploaded_by),
        created_at: model.created_at.with_timezone(&Utc),
        completed_at: model.completed_at.map(|t| t.with_timezone(&Utc)),
        has_thumbnail: model.has_thumbnail,
        version: model.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> attachments::Model {
        let now = Utc::now();
        attachments::Model {
            id: Uuid::now_v7(),
            parent_type: "incident".to_string(),
            parent_id: Uuid::now_v7(),
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            size: Some(42),
            status: "completed".to_string(),
            storage_path: "incidents/x/y/a.png".to_string(),
            uploaded_by: Uuid::now_v7(),
            created_at: now.into(),
            completed_at: Some(now.into()),
            has_thumbnail: false,
            version: 3,
        }
    }

    #[test]
    fn test_to_domain_maps_columns() {
        let model = row();
        let attachment = to_domain(model.clone()).unwrap();

        assert_eq!(attachment.id().into_inner(), model.id);
        assert_eq!(attachment.parent_type(), ParentType::Incident);
        assert_eq!(attachment.status(), AttachmentStatus::Completed);
        assert_eq!(attachment.size(), Some(42));
        assert_eq!(attachment.version(), 3);
    }

    #[test]
    fn test_to_domain_rejects_unknown_status() {
        let mut model = row();
        model.status = "archived".to_string();

        assert!(matches!(
            to_domain(model),
            Err(AttachmentError::Repository(_))
        ));
    }

    #[test]
    fn test_to_domain_rejects_negative_size() {
        let mut model = row();
        model.size = Some(-1);

        assert!(to_domain(model).is_err());
    }

    #[test]
    fn test_active_model_roundtrip() {
        let attachment = to_domain(row()).unwrap();
        let active = to_active_model(&attachment.to_snapshot()).unwrap();

        assert_eq!(active.size, Set(Some(42)));
        assert_eq!(active.status, Set("completed".to_string()));
        assert_eq!(active.version, Set(3));
    }
}
