//! Core business logic for the incident reporting API.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Persistence is reached through repository traits implemented by the db crate.
//!
//! # Modules
//!
//! - `storage` - Blob storage port, OpenDAL and loopback backends
//! - `attachment` - Attachment aggregate, policy, and upload lifecycle
//! - `sanitize` - Best-effort image metadata stripping
//! - `idempotency` - First-write-wins response store
//! - `incident` - Idempotent bulk status command
//! - `signing` - HMAC-signed download links

pub mod attachment;
pub mod idempotency;
pub mod incident;
pub mod sanitize;
pub mod signing;
pub mod storage;
