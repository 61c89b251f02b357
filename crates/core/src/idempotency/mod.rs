//! Idempotent replay of mutating commands.
//!
//! Clients send an `Idempotency-Key`; the first response stored under a key
//! is authoritative until the record expires.

mod error;
mod hash;
mod memory;
mod store;

#[cfg(test)]
mod store_props;

pub use error::IdempotencyError;
pub use hash::{canonical_json, payload_hash};
pub use memory::InMemoryIdempotencyStore;
pub use store::{
    IdempotencyRecord, IdempotencyStore, MAX_KEY_CHARS, StoredResponse, validate_key,
};
