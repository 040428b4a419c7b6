//! Pure copy-on-write collection transforms.

use chrono::Utc;
use serde_json::Value;

use crate::error::ValidationError;
use crate::model::Entity;

/// Append `entity`, stamping its modification time.
pub fn add<T: Entity>(collection: &[T], entity: T) -> Vec<T> {
  let mut entity = entity;
  entity.touch(Utc::now());
  let mut next = collection.to_vec();
  next.push(entity);
  next
}

/// Merge `patch` over the entity with `id` and stamp it as modified.
///
/// The patch is a JSON object whose top-level fields replace the entity's.
/// `id` is never changed and `updatedAt` is always set by this function. A
/// missing id returns an unchanged copy: the entity may have been deleted
/// concurrently.
pub fn update<T: Entity>(collection: &[T], id: &str, patch: &Value) -> Result<Vec<T>, ValidationError> {
  let invalid = |reason: String| ValidationError::InvalidPatch {
    id: id.to_string(),
    reason,
  };

  let patch = patch
    .as_object()
    .ok_or_else(|| invalid("patch must be a JSON object".to_string()))?;

  collection
    .iter()
    .map(|entity| {
      if entity.id() != id {
        return Ok(entity.clone());
      }

      let mut merged = serde_json::to_value(entity).map_err(|e| invalid(e.to_string()))?;
      if let Some(fields) = merged.as_object_mut() {
        for (field, value) in patch {
          fields.insert(field.clone(), value.clone());
        }
        fields.insert("id".to_string(), Value::String(id.to_string()));
      }

      let mut updated: T = serde_json::from_value(merged).map_err(|e| invalid(e.to_string()))?;
      updated.touch(Utc::now());
      Ok(updated)
    })
    .collect()
}

/// Remove the entity with `id`. A missing id is a no-op.
pub fn delete<T: Entity>(collection: &[T], id: &str) -> Vec<T> {
  collection
    .iter()
    .filter(|entity| entity.id() != id)
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Task, TaskStatus};
  use chrono::{DateTime, TimeZone, Utc};
  use serde_json::json;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
  }

  fn milk() -> Task {
    Task {
      id: "1".to_string(),
      created_at: t0(),
      updated_at: t0(),
      ..Task::new("Buy milk")
    }
  }

  #[test]
  fn test_update_merges_patch_and_refreshes_updated_at() {
    let tasks = vec![milk()];
    let updated = update(&tasks, "1", &json!({"title": "Buy oat milk"})).unwrap();

    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].title, "Buy oat milk");
    assert!(updated[0].updated_at > t0());
    assert_eq!(updated[0].created_at, t0());
    // Input untouched
    assert_eq!(tasks[0].title, "Buy milk");
  }

  #[test]
  fn test_update_missing_id_is_noop() {
    let tasks = vec![milk()];
    let updated = update(&tasks, "42", &json!({"title": "nope"})).unwrap();
    assert_eq!(updated, tasks);
  }

  #[test]
  fn test_update_ignores_caller_id_and_timestamp() {
    let tasks = vec![milk()];
    let updated = update(
      &tasks,
      "1",
      &json!({"id": "other", "updatedAt": "2000-01-01T00:00:00Z", "status": "done"}),
    )
    .unwrap();
    assert_eq!(updated[0].id, "1");
    assert_eq!(updated[0].status, TaskStatus::Done);
    assert!(updated[0].updated_at > t0());
  }

  #[test]
  fn test_update_rejects_ill_typed_patch() {
    let tasks = vec![milk()];
    assert!(update(&tasks, "1", &json!({"status": "someday"})).is_err());
    assert!(update(&tasks, "1", &json!("title")).is_err());
  }

  #[test]
  fn test_delete() {
    let tasks = vec![milk(), Task::new("Walk dog")];
    let remaining = delete(&tasks, "1");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "Walk dog");
    assert_eq!(delete(&remaining, "1"), remaining);
  }

  #[test]
  fn test_add_appends_in_order() {
    let tasks = add(&[milk()], Task::new("Walk dog"));
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1].title, "Walk dog");
  }
}
