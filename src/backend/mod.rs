//! Synchronous string-keyed persistence that everything else builds on.
//!
//! This module provides:
//! - The [`KvBackend`] trait: get/set/remove over string keys and values
//! - [`SqliteBackend`], the durable on-disk implementation
//! - [`MemoryBackend`], used for ephemeral contexts and tests

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::sync::Arc;

use crate::error::StorageError;

/// Trait for key-value storage backends.
pub trait KvBackend: Send + Sync + 'static {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<B: KvBackend + ?Sized> KvBackend for Arc<B> {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    (**self).set(key, value)
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    (**self).remove(key)
  }
}

/// Reject values larger than the configured quota.
pub(crate) fn check_quota(key: &str, value: &str, quota: Option<usize>) -> Result<(), StorageError> {
  match quota {
    Some(limit) if value.len() > limit => Err(StorageError::QuotaExceeded {
      key: key.to_string(),
      size: value.len(),
      limit,
    }),
    _ => Ok(()),
  }
}
