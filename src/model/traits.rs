//! Core trait and class tag for persisted entities.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Structural class of an entity, used to pick a validation schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
  Task,
  Note,
  Service,
  Device,
  Automation,
}

impl EntityClass {
  /// Name used in log fields and error messages.
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityClass::Task => "task",
      EntityClass::Note => "note",
      EntityClass::Service => "service",
      EntityClass::Device => "device",
      EntityClass::Automation => "automation",
    }
  }
}

impl fmt::Display for EntityClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Trait for entities that can be persisted in a collection.
///
/// Implementors provide a unique id and let the store own the modification
/// timestamp through [`Entity::touch`].
pub trait Entity:
  Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
  /// Unique identifier within its collection
  fn id(&self) -> &str;

  /// Display title (tasks/notes) or name (homelab inventory)
  fn title(&self) -> &str;

  /// Last modification time, if the entity tracks one
  fn updated_at(&self) -> Option<DateTime<Utc>>;

  /// Record a mutation at `now`.
  fn touch(&mut self, now: DateTime<Utc>);

  /// Schema class for validation
  fn class() -> EntityClass;
}
