//! `SeaORM` entity definitions.

pub mod attachments;
pub mod comments;
pub mod idempotency_records;
pub mod incidents;
