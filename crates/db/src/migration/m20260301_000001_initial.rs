//! Initial database migration.
//!
//! Creates the incident, comment, attachment, and idempotency tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(INCIDENTS_SQL).await?;
        db.execute_unprepared(COMMENTS_SQL).await?;
        db.execute_unprepared(ATTACHMENTS_SQL).await?;
        db.execute_unprepared(IDEMPOTENCY_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS idempotency_records, attachments, comments, incidents CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const INCIDENTS_SQL: &str = r"
CREATE TABLE incidents (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(200) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status VARCHAR(20) NOT NULL DEFAULT 'open',
    reported_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_incident_status CHECK (status IN ('open', 'in_progress', 'resolved', 'closed'))
);

CREATE INDEX idx_incidents_status ON incidents(status, created_at DESC);
";

const COMMENTS_SQL: &str = r"
CREATE TABLE comments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    incident_id UUID NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
    author_id UUID NOT NULL,
    body TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_comments_incident ON comments(incident_id, created_at);
";

const ATTACHMENTS_SQL: &str = r"
-- Parent is polymorphic (incident or comment), so there is no foreign key.
CREATE TABLE attachments (
    id UUID PRIMARY KEY,
    parent_type VARCHAR(20) NOT NULL,
    parent_id UUID NOT NULL,
    file_name VARCHAR(255) NOT NULL,
    content_type VARCHAR(255) NOT NULL,
    size BIGINT,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    storage_path VARCHAR(512) NOT NULL,
    uploaded_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    completed_at TIMESTAMPTZ,
    has_thumbnail BOOLEAN NOT NULL DEFAULT false,
    version INTEGER NOT NULL DEFAULT 1,
    CONSTRAINT chk_attachment_parent_type CHECK (parent_type IN ('incident', 'comment')),
    CONSTRAINT chk_attachment_status CHECK (status IN ('pending', 'completed', 'blocked')),
    CONSTRAINT chk_attachment_storage_path CHECK (storage_path <> ''),
    CONSTRAINT chk_attachment_completion CHECK (
        (status = 'pending' AND size IS NULL AND completed_at IS NULL)
        OR (status <> 'pending' AND size IS NOT NULL AND completed_at IS NOT NULL)
    ),
    CONSTRAINT chk_attachment_size CHECK (size IS NULL OR size > 0)
);

CREATE INDEX idx_attachments_parent ON attachments(parent_type, parent_id);
CREATE INDEX idx_attachments_created ON attachments(created_at);
";

const IDEMPOTENCY_SQL: &str = r"
CREATE TABLE idempotency_records (
    -- First write wins: the primary key serializes concurrent inserts for a key.
    key VARCHAR(256) PRIMARY KEY,
    payload_hash VARCHAR(64) NOT NULL,
    response_json TEXT NOT NULL,
    response_content_type VARCHAR(100) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    expires_at TIMESTAMPTZ NOT NULL,
    CONSTRAINT chk_idempotency_expiry CHECK (expires_at >= created_at)
);

CREATE INDEX idx_idempotency_expires ON idempotency_records(expires_at);
";
