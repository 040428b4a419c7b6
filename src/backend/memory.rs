//! In-process key-value backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{check_quota, KvBackend};
use crate::error::StorageError;

/// Backend that keeps everything in a map. Nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
  entries: Mutex<BTreeMap<String, String>>,
  quota: Option<usize>,
  writes: AtomicUsize,
  fail_reads: AtomicBool,
  failing_writes: Mutex<HashSet<String>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Limit the size of any single stored value.
  pub fn with_quota(mut self, bytes: Option<usize>) -> Self {
    self.quota = bytes;
    self
  }

  /// Number of successful `set`/`remove` calls so far.
  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  /// Make every read fail until reset.
  #[cfg(test)]
  pub(crate) fn set_fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  /// Make writes to `key` fail.
  #[cfg(test)]
  pub(crate) fn fail_writes_to(&self, key: &str) {
    if let Ok(mut failing) = self.failing_writes.lock() {
      failing.insert(key.to_string());
    }
  }

  #[cfg(test)]
  pub(crate) fn clear_write_failures(&self) {
    if let Ok(mut failing) = self.failing_writes.lock() {
      failing.clear();
    }
  }

  fn lock(&self, key: &str) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
    self.entries.lock().map_err(|e| StorageError::Read {
      key: key.to_string(),
      message: format!("lock poisoned: {}", e),
    })
  }

  fn check_writable(&self, key: &str) -> Result<(), StorageError> {
    let failing = self
      .failing_writes
      .lock()
      .map(|failing| failing.contains(key))
      .unwrap_or(false);
    if failing {
      return Err(StorageError::Write {
        key: key.to_string(),
        message: "write rejected".to_string(),
      });
    }
    Ok(())
  }
}

impl KvBackend for MemoryBackend {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(StorageError::Read {
        key: key.to_string(),
        message: "read rejected".to_string(),
      });
    }
    Ok(self.lock(key)?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    check_quota(key, value, self.quota)?;
    self.check_writable(key)?;
    self
      .lock(key)?
      .insert(key.to_string(), value.to_string());
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.check_writable(key)?;
    self.lock(key)?.remove(key);
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
