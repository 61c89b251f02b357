//! Existence checks for attachment owners.

use incident_core::attachment::{AttachmentError, ParentLookup, ParentType};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use uuid::Uuid;

use crate::entities::{comments, incidents};

/// Looks up incidents and comments that may own attachments.
#[derive(Debug, Clone)]
pub struct ParentRepository {
    db: DatabaseConnection,
}

impl ParentRepository {
    /// Create a new parent repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl ParentLookup for ParentRepository {
    async fn parent_exists(
        &self,
        parent_type: ParentType,
        parent_id: Uuid,
    ) -> Result<bool, AttachmentError> {
        let count = match parent_type {
            ParentType::None => return Ok(false),
            ParentType::Incident => incidents::Entity::find_by_id(parent_id).count(&self.db).await,
            ParentType::Comment => comments::Entity::find_by_id(parent_id).count(&self.db).await,
        }
        .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(count > 0)
    }
}
