//! Storage module
//!
//! Provides the client-local key-value storage areas: a per-tab session
//! area and an origin-wide persistent area whose writes are announced to
//! the other tabs as storage events.

pub mod area;
pub mod kv_store;

pub use area::{StorageArea, StorageEvent, StorageListener};
pub use kv_store::{KeyValueStore, MemoryStore};
