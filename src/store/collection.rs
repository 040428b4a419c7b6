//! In-memory view of one persisted collection.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

use super::entity_store::EntityStore;
use super::ops;
use crate::autosave::Flushable;
use crate::backend::KvBackend;
use crate::error::{ReconciliationParseError, StoreError};
use crate::model::Entity;

/// What a reconciliation did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
  /// Incoming data matched local state
  Unchanged,
  /// Local state was replaced
  Replaced { len: usize },
}

struct State<T> {
  items: Vec<T>,
  /// Local state differs from what was last written successfully
  dirty: bool,
}

/// A collection of entities backed by one logical key.
///
/// Mutations build a new snapshot from the current one, save it through the
/// [`EntityStore`] and only then publish it as current. A snapshot the
/// validator rejects is dropped. A snapshot the backend failed to write is
/// kept and marked dirty so the autosave scheduler retries it.
pub struct Collection<T: Entity, B: KvBackend> {
  key: String,
  store: Arc<EntityStore<B>>,
  state: Mutex<State<T>>,
}

impl<T: Entity, B: KvBackend> Collection<T, B> {
  /// Open the collection under `key`, starting empty if nothing is stored.
  pub fn open(store: Arc<EntityStore<B>>, key: impl Into<String>) -> Self {
    let key = key.into();
    let items = store.load::<T>(&key).unwrap_or_default();
    tracing::debug!(key = %key, entities = items.len(), "collection opened");

    Self {
      key,
      store,
      state: Mutex::new(State {
        items,
        dirty: false,
      }),
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn list(&self) -> Vec<T> {
    self.lock().items.clone()
  }

  pub fn get(&self, id: &str) -> Option<T> {
    self.lock().items.iter().find(|e| e.id() == id).cloned()
  }

  pub fn len(&self) -> usize {
    self.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().items.is_empty()
  }

  pub fn is_dirty(&self) -> bool {
    self.lock().dirty
  }

  /// Append `entity` and persist. Returns the entity as stored.
  pub fn add(&self, entity: T) -> Result<T, StoreError> {
    let mut state = self.lock();
    let next = ops::add(&state.items, entity);
    let stored = next[next.len() - 1].clone();
    self.commit(&mut state, next)?;
    Ok(stored)
  }

  /// Merge `patch` over entity `id` and persist.
  ///
  /// Returns `Ok(None)` when no entity has that id.
  pub fn update(&self, id: &str, patch: &Value) -> Result<Option<T>, StoreError> {
    let mut state = self.lock();
    if !state.items.iter().any(|e| e.id() == id) {
      tracing::debug!(key = %self.key, id, "update of unknown id ignored");
      return Ok(None);
    }

    let next = ops::update(&state.items, id, patch)?;
    let updated = next.iter().find(|e| e.id() == id).cloned();
    self.commit(&mut state, next)?;
    Ok(updated)
  }

  /// Remove entity `id` and persist. Returns whether anything was removed.
  pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
    let mut state = self.lock();
    let next = ops::delete(&state.items, id);
    if next.len() == state.items.len() {
      return Ok(false);
    }
    self.commit(&mut state, next)?;
    Ok(true)
  }

  /// Replace the whole collection, e.g. with a fresh remote inventory.
  ///
  /// Entities equal to their stored version keep their timestamps, changed
  /// ones are stamped now. Returns `false` without writing when nothing changed.
  pub fn replace_all(&self, items: Vec<T>) -> Result<bool, StoreError> {
    let mut state = self.lock();
    let now = chrono::Utc::now();

    let next: Vec<T> = items
      .into_iter()
      .map(|incoming| {
        let existing = state.items.iter().find(|e| e.id() == incoming.id());
        match existing {
          Some(existing) => {
            let mut candidate = incoming.clone();
            if let Some(ts) = existing.updated_at() {
              candidate.touch(ts);
            }
            if &candidate == existing {
              candidate
            } else {
              let mut changed = incoming;
              changed.touch(now);
              changed
            }
          }
          None => {
            let mut added = incoming;
            added.touch(now);
            added
          }
        }
      })
      .collect();

    if next == state.items {
      return Ok(false);
    }
    self.commit(&mut state, next)?;
    Ok(true)
  }

  /// Remove every entity along with the primary and backup keys.
  pub fn clear(&self) -> Result<(), StoreError> {
    let mut state = self.lock();
    state.items.clear();
    match self.store.clear(&self.key) {
      Ok(()) => {
        state.dirty = false;
        Ok(())
      }
      Err(e) => {
        state.dirty = true;
        Err(e)
      }
    }
  }

  /// Persist the current state regardless of the dirty flag.
  pub fn save(&self) -> Result<(), StoreError> {
    let mut state = self.lock();
    self.store.save(&self.key, &state.items)?;
    state.dirty = false;
    Ok(())
  }

  /// Apply a value another context wrote to this collection's key.
  ///
  /// `None` means the key was removed. Local state is replaced only when the
  /// incoming collection differs, and nothing is written back.
  pub fn reconcile(&self, value: Option<&str>) -> Result<Reconciliation, ReconciliationParseError> {
    let (values, incoming) = match value {
      Some(raw) => {
        let (values, items) =
          self
            .store
            .decode::<T>(&self.key, raw)
            .map_err(|message| ReconciliationParseError {
              key: self.key.clone(),
              message,
            })?;
        (Some(values), items)
      }
      None => (None, Vec::new()),
    };

    let mut state = self.lock();
    if state.items == incoming {
      return Ok(Reconciliation::Unchanged);
    }

    let len = incoming.len();
    state.items = incoming;
    // The backend now holds exactly this state
    state.dirty = false;
    self.store.refresh_cache(&self.key, values);
    tracing::info!(key = %self.key, entities = len, "reconciled external change");
    Ok(Reconciliation::Replaced { len })
  }

  /// Reload from the backend, bypassing the cache.
  pub fn resync(&self) -> Reconciliation {
    self.store.refresh_cache(&self.key, None);
    let items = self.store.load::<T>(&self.key).unwrap_or_default();

    let mut state = self.lock();
    if state.items == items {
      return Reconciliation::Unchanged;
    }
    let len = items.len();
    state.items = items;
    state.dirty = false;
    Reconciliation::Replaced { len }
  }

  fn commit(&self, state: &mut State<T>, next: Vec<T>) -> Result<(), StoreError> {
    match self.store.save(&self.key, &next) {
      Ok(()) => {
        state.items = next;
        state.dirty = false;
        Ok(())
      }
      Err(StoreError::Validation(e)) => Err(e.into()),
      Err(e @ StoreError::Storage(_)) => {
        tracing::warn!(key = %self.key, error = %e, "keeping unsaved changes for autosave");
        state.items = next;
        state.dirty = true;
        Err(e)
      }
    }
  }

  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<T: Entity, B: KvBackend> Flushable for Collection<T, B> {
  fn key(&self) -> &str {
    &self.key
  }

  fn is_dirty(&self) -> bool {
    Collection::is_dirty(self)
  }

  fn flush(&self) -> Result<bool, StoreError> {
    let mut state = self.lock();
    if !state.dirty {
      return Ok(false);
    }
    self.store.save(&self.key, &state.items)?;
    state.dirty = false;
    Ok(true)
  }
}
