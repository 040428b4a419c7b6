use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::KvBackend;
use crate::error::StorageError;

/// Default number of events buffered per subscriber.
const BUS_CAPACITY: usize = 256;

/// Identity of one execution context sharing the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for ContextId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for ContextId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A backend mutation observed on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
  pub key: String,
  /// New raw value, `None` when the key was removed
  pub value: Option<String>,
  pub origin: ContextId,
}

/// Publish/subscribe channel shared by every context on the same backend.
#[derive(Debug, Clone)]
pub struct ChangeBus {
  tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
  fn default() -> Self {
    Self::new()
  }
}

impl ChangeBus {
  pub fn new() -> Self {
    Self::with_capacity(BUS_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let (tx, _rx) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn publish(&self, event: ChangeEvent) {
    // No subscribers is fine
    let _ = self.tx.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
    self.tx.subscribe()
  }
}

/// Backend wrapper that announces every successful write on the bus.
pub struct NotifyingBackend<B: KvBackend> {
  inner: B,
  bus: ChangeBus,
  origin: ContextId,
}

impl<B: KvBackend> NotifyingBackend<B> {
  pub fn new(inner: B, bus: ChangeBus, origin: ContextId) -> Self {
    Self { inner, bus, origin }
  }

  pub fn origin(&self) -> ContextId {
    self.origin
  }

  pub fn bus(&self) -> &ChangeBus {
    &self.bus
  }

  pub fn inner(&self) -> &B {
    &self.inner
  }
}

impl<B: KvBackend> KvBackend for NotifyingBackend<B> {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    self.inner.get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.inner.set(key, value)?;
    self.bus.publish(ChangeEvent {
      key: key.to_string(),
      value: Some(value.to_string()),
      origin: self.origin,
    });
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.inner.remove(key)?;
    self.bus.publish(ChangeEvent {
      key: key.to_string(),
      value: None,
      origin: self.origin,
    });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::MemoryBackend;

  #[test]
  fn test_writes_are_published_with_origin() {
    let bus = ChangeBus::new();
    let mut rx = bus.subscribe();
    let origin = ContextId::new();
    let backend = NotifyingBackend::new(MemoryBackend::new(), bus, origin);

    backend.set("tasks", "[]").unwrap();
    backend.remove("tasks").unwrap();

    let first = rx.try_recv().unwrap();
    assert_eq!(first.key, "tasks");
    assert_eq!(first.value.as_deref(), Some("[]"));
    assert_eq!(first.origin, origin);
    assert_eq!(rx.try_recv().unwrap().value, None);
  }

  #[test]
  fn test_failed_writes_are_not_published() {
    let bus = ChangeBus::new();
    let mut rx = bus.subscribe();
    let backend = NotifyingBackend::new(
      MemoryBackend::new().with_quota(Some(1)),
      bus,
      ContextId::new(),
    );

    assert!(backend.set("tasks", "[1,2,3]").is_err());
    assert!(rx.try_recv().is_err());
  }
}
