//! Best-effort persisted log of store failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::backend::KvBackend;

/// Key the error log is persisted under.
pub const ERROR_LOG_KEY: &str = "error_log";

/// Default number of entries kept.
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
  pub timestamp: DateTime<Utc>,
  pub operation: String,
  pub key: String,
  pub error: String,
}

/// Ring buffer of the most recent store failures.
///
/// Writing the log never fails the caller: problems with the log itself are
/// reported through `tracing` only.
#[derive(Debug)]
pub struct ErrorLog {
  capacity: usize,
  write_lock: Mutex<()>,
}

impl Default for ErrorLog {
  fn default() -> Self {
    Self::new(DEFAULT_ERROR_LOG_CAPACITY)
  }
}

impl ErrorLog {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      write_lock: Mutex::new(()),
    }
  }

  /// Append an entry, dropping the oldest ones beyond capacity.
  pub fn record<B: KvBackend>(&self, backend: &B, operation: &str, key: &str, message: &str) {
    tracing::error!(operation, key, message, "store operation failed");

    let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
    let mut entries: VecDeque<ErrorLogEntry> = self.entries(backend).into();
    entries.push_back(ErrorLogEntry {
      timestamp: Utc::now(),
      operation: operation.to_string(),
      key: key.to_string(),
      error: message.to_string(),
    });
    while entries.len() > self.capacity {
      entries.pop_front();
    }

    let encoded = match serde_json::to_string(&entries) {
      Ok(encoded) => encoded,
      Err(e) => {
        tracing::warn!(error = %e, "could not serialize error log");
        return;
      }
    };
    if let Err(e) = backend.set(ERROR_LOG_KEY, &encoded) {
      tracing::warn!(error = %e, "could not persist error log");
    }
  }

  /// Entries currently persisted, oldest first. Unreadable logs read as empty.
  pub fn entries<B: KvBackend>(&self, backend: &B) -> Vec<ErrorLogEntry> {
    match backend.get(ERROR_LOG_KEY) {
      Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "discarding unreadable error log");
        Vec::new()
      }),
      Ok(None) => Vec::new(),
      Err(e) => {
        tracing::warn!(error = %e, "could not read error log");
        Vec::new()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::MemoryBackend;

  #[test]
  fn test_ring_buffer_drops_oldest() {
    let backend = MemoryBackend::new();
    let log = ErrorLog::new(3);
    for i in 0..5 {
      log.record(&backend, "save", "tasks", &format!("failure {}", i));
    }

    let entries = log.entries(&backend);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].error, "failure 2");
    assert_eq!(entries[2].error, "failure 4");
  }

  #[test]
  fn test_log_write_failure_is_swallowed() {
    let backend = MemoryBackend::new();
    backend.fail_writes_to(ERROR_LOG_KEY);
    let log = ErrorLog::default();
    log.record(&backend, "save", "tasks", "disk full");
    assert!(log.entries(&backend).is_empty());
  }
}
