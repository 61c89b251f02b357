//! Incident commands used by the attachment core's consumers.
//!
//! Only the idempotent bulk status change lives here; incident CRUD is
//! plain persistence.

mod bulk;
mod error;
mod types;

pub use bulk::{BulkStatusOutcome, BulkStatusService, IncidentRepository, MAX_BULK_IDS};
pub use error::IncidentError;
pub use types::{BulkStatusRequest, BulkStatusResponse, BulkUpdateOutcome, IncidentStatus};
