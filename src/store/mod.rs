//! Durable entity collections with backup and self-healing reads.
//!
//! [`EntityStore`] writes every collection twice (`key` and `key_backup`) inside a
//! versioned [`StorageRecord`] envelope, and [`Collection`] is the in-memory,
//! copy-on-write view consumers mutate.

mod collection;
mod entity_store;
mod error_log;
mod ops;
mod record;

pub use collection::{Collection, Reconciliation};
pub use entity_store::EntityStore;
pub use error_log::{ErrorLog, ErrorLogEntry, ERROR_LOG_KEY};
pub use ops::{add, delete, update};
pub use record::{StorageRecord, STORAGE_VERSION};
