//! Save-with-backup and load-with-recovery over a key-value backend.

use chrono::Duration;
use serde_json::Value;

use super::error_log::ErrorLog;
use super::record::StorageRecord;
use crate::backend::KvBackend;
use crate::cache::{CacheLayer, CacheResult};
use crate::error::{StorageError, StoreError};
use crate::model::Entity;
use crate::validate::{ValidatorRegistry, BACKUP_SUFFIX};

/// Outcome of reading one physical slot.
enum Slot<T> {
  Found(Vec<Value>, Vec<T>),
  Missing,
  Corrupt(String),
  Failed(StorageError),
}

/// Entity store over a key-value backend.
///
/// Every collection lives under its logical key and a parallel
/// `<key>_backup` key. Reads fall back to the backup and restore the primary
/// from it when the primary is missing or unreadable.
pub struct EntityStore<B: KvBackend> {
  backend: B,
  registry: ValidatorRegistry,
  cache: CacheLayer<Vec<Value>>,
  error_log: ErrorLog,
}

impl<B: KvBackend> EntityStore<B> {
  pub fn new(backend: B) -> Self {
    Self {
      backend,
      registry: ValidatorRegistry::default(),
      cache: CacheLayer::new(),
      error_log: ErrorLog::default(),
    }
  }

  pub fn with_registry(mut self, registry: ValidatorRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache = CacheLayer::new().with_stale_time(ttl);
    self
  }

  pub fn with_error_log(mut self, error_log: ErrorLog) -> Self {
    self.error_log = error_log;
    self
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn registry(&self) -> &ValidatorRegistry {
    &self.registry
  }

  pub fn error_log(&self) -> &ErrorLog {
    &self.error_log
  }

  /// Validate `collection` and write it to the primary and backup keys.
  pub fn save<T: Entity>(&self, key: &str, collection: &[T]) -> Result<(), StoreError> {
    let values = collection
      .iter()
      .map(serde_json::to_value)
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| self.fail_serialize("save", key, e))?;

    self.save_values(key, values)
  }

  /// Validate and write already-serialized entities.
  pub fn save_values(&self, key: &str, values: Vec<Value>) -> Result<(), StoreError> {
    if let Err(e) = self.registry.validate(key, &values) {
      tracing::warn!(key, error = %e, "rejecting invalid collection");
      self.error_log.record(&self.backend, "validate", key, &e.to_string());
      return Err(e.into());
    }

    let encoded = StorageRecord::new(values.clone())
      .and_then(|record| record.encode())
      .map_err(|e| self.fail_serialize("save", key, e))?;

    let primary = self.backend.set(key, &encoded);
    if let Err(e) = &primary {
      self.error_log.record(&self.backend, "save", key, &e.to_string());
    }

    let backup_key = backup_key(key);
    if let Err(e) = self.backend.set(&backup_key, &encoded) {
      self
        .error_log
        .record(&self.backend, "backup", &backup_key, &e.to_string());
    }

    primary?;
    self.cache.put(key, values);
    tracing::debug!(key, bytes = encoded.len(), "collection saved");
    Ok(())
  }

  /// Load the collection under `key`, or `None` if nothing usable exists.
  pub fn load<T: Entity>(&self, key: &str) -> Option<Vec<T>> {
    self.load_with_source(key).map(|result| result.data)
  }

  /// Like [`EntityStore::load`], reporting whether the data came from the cache.
  pub fn load_with_source<T: Entity>(&self, key: &str) -> Option<CacheResult<Vec<T>>> {
    if let Some(hit) = self.cache.fresh(key) {
      match deserialize_all::<T>(&hit.data) {
        Ok(items) => return Some(hit.map(|_| items)),
        Err(e) => {
          tracing::warn!(key, error = %e, "cached collection no longer deserializes");
          self.cache.invalidate(key);
        }
      }
    }

    let backup_key = backup_key(key);
    let primary = self.read_slot::<T>(key);
    let primary_failed = match primary {
      Slot::Found(values, items) => {
        self.cache.put(key, values);
        return Some(CacheResult::from_backend(items));
      }
      Slot::Missing => {
        tracing::debug!(key, "primary missing, trying backup");
        false
      }
      Slot::Corrupt(reason) => {
        tracing::warn!(key, reason = %reason, "primary corrupt, trying backup");
        self.error_log.record(&self.backend, "load", key, &reason);
        false
      }
      Slot::Failed(e) => {
        self.error_log.record(&self.backend, "load", key, &e.to_string());
        true
      }
    };

    let backup_failed = match self.read_slot::<T>(&backup_key) {
      Slot::Found(values, items) => {
        self.self_heal(key, &values);
        self.cache.put(key, values);
        return Some(CacheResult::from_backend(items));
      }
      Slot::Missing => false,
      Slot::Corrupt(reason) => {
        self
          .error_log
          .record(&self.backend, "load", &backup_key, &reason);
        false
      }
      Slot::Failed(e) => {
        self
          .error_log
          .record(&self.backend, "load", &backup_key, &e.to_string());
        true
      }
    };

    if primary_failed || backup_failed {
      if let Some(stale) = self.cache.last_resort(key) {
        if let Ok(items) = deserialize_all::<T>(&stale.data) {
          tracing::warn!(key, "backend unavailable, serving last cached collection");
          return Some(stale.map(|_| items));
        }
      }
    }

    None
  }

  /// Remove both the primary and backup copies of `key`.
  pub fn clear(&self, key: &str) -> Result<(), StoreError> {
    self.cache.invalidate(key);

    let primary = self.backend.remove(key);
    if let Err(e) = &primary {
      self.error_log.record(&self.backend, "clear", key, &e.to_string());
    }

    let backup_key = backup_key(key);
    if let Err(e) = self.backend.remove(&backup_key) {
      self
        .error_log
        .record(&self.backend, "clear", &backup_key, &e.to_string());
    }

    primary.map_err(StoreError::from)
  }

  /// Decode and validate a raw stored value for `key` without touching the backend.
  pub fn decode<T: Entity>(&self, key: &str, raw: &str) -> Result<(Vec<Value>, Vec<T>), String> {
    let record = StorageRecord::decode(raw)?;
    self
      .registry
      .validate(key, &record.data)
      .map_err(|e| e.to_string())?;
    let items = deserialize_all::<T>(&record.data)?;
    Ok((record.data, items))
  }

  /// Replace the cached copy of `key` after an external write.
  pub fn refresh_cache(&self, key: &str, values: Option<Vec<Value>>) {
    match values {
      Some(values) => self.cache.put(key, values),
      None => self.cache.invalidate(key),
    }
  }

  fn read_slot<T: Entity>(&self, key: &str) -> Slot<T> {
    match self.backend.get(key) {
      Ok(Some(raw)) => match self.decode::<T>(key, &raw) {
        Ok((values, items)) => Slot::Found(values, items),
        Err(reason) => Slot::Corrupt(reason),
      },
      Ok(None) => Slot::Missing,
      Err(e) => Slot::Failed(e),
    }
  }

  fn self_heal(&self, key: &str, values: &[Value]) {
    let encoded = match StorageRecord::new(values.to_vec()).and_then(|record| record.encode()) {
      Ok(encoded) => encoded,
      Err(e) => {
        self.error_log.record(&self.backend, "restore", key, &e.to_string());
        return;
      }
    };

    match self.backend.set(key, &encoded) {
      Ok(()) => tracing::info!(key, entities = values.len(), "primary restored from backup"),
      Err(e) => self.error_log.record(&self.backend, "restore", key, &e.to_string()),
    }
  }

  fn fail_serialize(&self, operation: &str, key: &str, e: serde_json::Error) -> StoreError {
    let err = StorageError::Serialize {
      key: key.to_string(),
      message: e.to_string(),
    };
    self.error_log.record(&self.backend, operation, key, &err.to_string());
    err.into()
  }
}

pub(crate) fn backup_key(key: &str) -> String {
  format!("{}{}", key, BACKUP_SUFFIX)
}

fn deserialize_all<T: Entity>(values: &[Value]) -> Result<Vec<T>, String> {
  values
    .iter()
    .map(|value| serde_json::from_value(value.clone()).map_err(|e| e.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::MemoryBackend;
  use crate::cache::CacheSource;
  use crate::error::ValidationError;
  use crate::model::{Note, Task};
  use crate::store::{update, ERROR_LOG_KEY};
  use chrono::{TimeZone, Utc};
  use serde_json::json;
  use std::sync::Arc;

  fn store() -> EntityStore<Arc<MemoryBackend>> {
    EntityStore::new(Arc::new(MemoryBackend::new()))
  }

  fn milk() -> Task {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Task {
      id: "1".to_string(),
      created_at: t0,
      updated_at: t0,
      ..Task::new("Buy milk")
    }
  }

  #[test]
  fn test_round_trip() {
    let store = store();
    let tasks = vec![milk(), Task::new("Walk dog")];
    store.save("tasks", &tasks).unwrap();

    // Bypass the cache so the backend path is exercised
    store.refresh_cache("tasks", None);
    let loaded = store.load_with_source::<Task>("tasks").unwrap();
    assert_eq!(loaded.data, tasks);
    assert_eq!(loaded.source, CacheSource::Backend);
  }

  #[test]
  fn test_save_writes_primary_and_backup() {
    let store = store();
    store.save("notes", &[Note::new("groceries", "eggs")]).unwrap();
    let backend = store.backend();
    assert!(backend.get("notes").unwrap().is_some());
    assert_eq!(
      backend.get("notes").unwrap(),
      backend.get("notes_backup").unwrap()
    );
  }

  #[test]
  fn test_invalid_collection_is_not_written() {
    let store = store();
    let mut bad = milk();
    bad.title = "   ".to_string();

    let err = store.save("tasks", &[bad]).unwrap_err();
    assert!(matches!(
      err,
      StoreError::Validation(ValidationError::MissingField { field: "title", .. })
    ));
    assert_eq!(store.backend().get("tasks").unwrap(), None);
    assert_eq!(store.backend().get("tasks_backup").unwrap(), None);
    assert_eq!(store.error_log().entries(store.backend()).len(), 1);
  }

  #[test]
  fn test_unregistered_key_rejected() {
    let store = store();
    assert!(matches!(
      store.save("bookmarks", &[milk()]),
      Err(StoreError::Validation(ValidationError::UnregisteredKey(_)))
    ));
  }

  #[test]
  fn test_self_heal_from_backup() {
    let store = store();
    let tasks = vec![milk()];
    store.save("tasks", &tasks).unwrap();
    store.backend().remove("tasks").unwrap();
    store.refresh_cache("tasks", None);

    let loaded: Vec<Task> = store.load("tasks").unwrap();
    assert_eq!(loaded, tasks);

    let restored = store.backend().get("tasks").unwrap().unwrap();
    let record = StorageRecord::decode(&restored).unwrap();
    assert_eq!(record.data, vec![serde_json::to_value(&tasks[0]).unwrap()]);
  }

  #[test]
  fn test_corrupt_primary_recovers_from_backup() {
    let store = store();
    store.save("tasks", &[milk()]).unwrap();
    store.backend().set("tasks", "{not json").unwrap();
    store.refresh_cache("tasks", None);

    let loaded: Vec<Task> = store.load("tasks").unwrap();
    assert_eq!(loaded, vec![milk()]);
    assert!(StorageRecord::decode(&store.backend().get("tasks").unwrap().unwrap()).is_ok());
  }

  #[test]
  fn test_both_slots_missing_or_corrupt() {
    let store = store();
    assert!(store.load::<Task>("tasks").is_none());

    store.backend().set("tasks", "garbage").unwrap();
    store.backend().set("tasks_backup", "[{\"id\": 3}]").unwrap();
    assert!(store.load::<Task>("tasks").is_none());
  }

  #[test]
  fn test_backup_failure_does_not_abort_primary() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_writes_to("tasks_backup");
    let store = EntityStore::new(Arc::clone(&backend));

    store.save("tasks", &[milk()]).unwrap();
    assert!(backend.get("tasks").unwrap().is_some());
    assert_eq!(backend.get("tasks_backup").unwrap(), None);

    let log = store.error_log().entries(&backend);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].operation, "backup");
    assert_eq!(log[0].key, "tasks_backup");
  }

  #[test]
  fn test_quota_failure_is_surfaced() {
    let backend = Arc::new(MemoryBackend::new().with_quota(Some(64)));
    let store = EntityStore::new(Arc::clone(&backend));

    let err = store.save("tasks", &[milk()]).unwrap_err();
    assert!(matches!(
      err,
      StoreError::Storage(StorageError::QuotaExceeded { .. })
    ));
    // The error log entry itself may not fit; the failure is still reported
    assert_eq!(backend.get("tasks").unwrap(), None);
  }

  #[test]
  fn test_stale_cache_used_when_backend_raises() {
    let backend = Arc::new(MemoryBackend::new());
    let store = EntityStore::new(Arc::clone(&backend)).with_cache_ttl(Duration::zero());
    store.save("tasks", &[milk()]).unwrap();

    backend.set_fail_reads(true);
    let loaded = store.load_with_source::<Task>("tasks").unwrap();
    assert_eq!(loaded.data, vec![milk()]);
    assert_eq!(loaded.source, CacheSource::CacheStale);
  }

  #[test]
  fn test_fresh_cache_skips_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let store = EntityStore::new(Arc::clone(&backend));
    store.save("tasks", &[milk()]).unwrap();

    backend.set_fail_reads(true);
    let loaded = store.load_with_source::<Task>("tasks").unwrap();
    assert_eq!(loaded.source, CacheSource::CacheFresh);
  }

  #[test]
  fn test_clear_removes_both_keys() {
    let store = store();
    store.save("tasks", &[milk()]).unwrap();
    store.clear("tasks").unwrap();

    assert_eq!(store.backend().get("tasks").unwrap(), None);
    assert_eq!(store.backend().get("tasks_backup").unwrap(), None);
    assert!(store.load::<Task>("tasks").is_none());
  }

  #[test]
  fn test_legacy_bare_array_loads() {
    let store = store();
    let legacy = serde_json::to_string(&vec![milk()]).unwrap();
    store.backend().set("tasks", &legacy).unwrap();

    let loaded: Vec<Task> = store.load("tasks").unwrap();
    assert_eq!(loaded, vec![milk()]);
  }

  #[test]
  fn test_save_then_update_scenario() {
    let store = store();
    let tasks = vec![milk()];
    store.save("tasks", &tasks).unwrap();

    let loaded: Vec<Task> = store.load("tasks").unwrap();
    let updated = update(&loaded, "1", &json!({"title": "Buy oat milk"})).unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].title, "Buy oat milk");
    assert!(updated[0].updated_at > tasks[0].updated_at);
    assert!(store.backend().get(ERROR_LOG_KEY).unwrap().is_none());
  }
}
