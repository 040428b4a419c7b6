//! Cache layer keeping the last known collection per key.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, CacheResult};

/// In-memory cache with a staleness window.
///
/// Fresh entries short-circuit backend reads. Stale entries are never served
/// on the normal path but stay available through [`CacheLayer::last_resort`].
pub struct CacheLayer<T: Clone> {
  entries: Mutex<HashMap<String, CacheEntry<T>>>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<T: Clone> Default for CacheLayer<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone> CacheLayer<T> {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at >= self.stale_time
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
    // The map holds plain data, a panic elsewhere cannot leave it half-written
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Record `data` as the current value for `key`.
  pub fn put(&self, key: &str, data: T) {
    self.entries().insert(
      key.to_string(),
      CacheEntry {
        data,
        timestamp: Utc::now(),
      },
    );
  }

  /// Cached value for `key`, only if still within the TTL.
  pub fn fresh(&self, key: &str) -> Option<CacheResult<T>> {
    let entries = self.entries();
    let entry = entries.get(key)?;
    if self.is_stale(entry.timestamp) {
      return None;
    }
    Some(CacheResult::from_cache(
      entry.data.clone(),
      entry.timestamp,
      false,
    ))
  }

  /// Cached value for `key` regardless of age.
  pub fn last_resort(&self, key: &str) -> Option<CacheResult<T>> {
    let entries = self.entries();
    let entry = entries.get(key)?;
    Some(CacheResult::from_cache(
      entry.data.clone(),
      entry.timestamp,
      self.is_stale(entry.timestamp),
    ))
  }

  pub fn invalidate(&self, key: &str) {
    self.entries().remove(key);
  }
}
