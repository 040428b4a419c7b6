//! Core types for the caching system.

use chrono::{DateTime, Utc};

/// A cached value and when it was cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  pub data: T,
  pub timestamp: DateTime<Utc>,
}

/// Result from a cache-aware read, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from data just read from the backend.
  pub fn from_backend(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Backend,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh read from the backend
  Backend,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, past its TTL, served because the backend failed
  CacheStale,
}
