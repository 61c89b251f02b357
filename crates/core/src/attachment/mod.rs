//! Attachment aggregate and upload lifecycle.
//!
//! This module provides business logic for file attachments including:
//! - Upload policy and structural validation
//! - Upload start (pending row + upload slot)
//! - Upload completion against the stored object
//! - Upload abort with best-effort storage cleanup
//! - Download of completed attachments

mod error;
mod policy;
mod service;
mod types;

#[cfg(test)]
mod service_props;

pub use error::AttachmentError;
pub use policy::{AttachmentPolicy, MAX_FILE_NAME_CHARS};
pub use service::{AttachmentRepository, AttachmentService, ParentLookup};
pub use types::{
    Attachment, AttachmentSnapshot, AttachmentStatus, NewAttachment, PENDING_STORAGE_PATH,
    ParentType, StartUploadInput, StartUploadResult,
};
