//! Repository implementations of the core persistence traits.

mod attachment;
mod idempotency;
mod incident;
mod parent;

pub use attachment::AttachmentRepository;
pub use idempotency::IdempotencyRepository;
pub use incident::IncidentRepository;
pub use parent::ParentRepository;
