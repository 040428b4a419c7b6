//! In-memory caching of loaded collections with staleness tolerance.
//!
//! This module provides a storage-agnostic cache that:
//! - Holds the last loaded or saved collection per logical key
//! - Serves entries as fresh for a fixed TTL (5 minutes by default)
//! - Keeps stale entries around as a last resort when the backend fails

mod layer;
mod traits;

pub use layer::CacheLayer;
pub use traits::{CacheEntry, CacheResult, CacheSource};
