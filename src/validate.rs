//! Structural validation of entity collections before they are written.
//!
//! Checks run on the JSON form so the same schema applies to data coming from
//! callers, from disk and from other contexts.

use chrono::DateTime;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::error::ValidationError;
use crate::model::EntityClass;

/// Suffix of the parallel key holding a collection's backup copy.
pub const BACKUP_SUFFIX: &str = "_backup";

const TASK_STATUSES: &[&str] = &["todo", "in_progress", "done"];
const TASK_PRIORITIES: &[&str] = &["low", "medium", "high"];
const SERVICE_STATUSES: &[&str] = &["running", "stopped", "error", "unknown"];

/// Maps logical store keys to the entity class their collections hold.
#[derive(Debug, Clone)]
pub struct ValidatorRegistry {
  classes: HashMap<String, EntityClass>,
}

impl Default for ValidatorRegistry {
  fn default() -> Self {
    let mut registry = Self::empty();
    registry.register("tasks", EntityClass::Task);
    registry.register("notes", EntityClass::Note);
    registry.register("services", EntityClass::Service);
    registry.register("network_devices", EntityClass::Device);
    registry.register("automation_rules", EntityClass::Automation);
    registry
  }
}

impl ValidatorRegistry {
  pub fn empty() -> Self {
    Self {
      classes: HashMap::new(),
    }
  }

  pub fn register(&mut self, key: impl Into<String>, class: EntityClass) {
    self.classes.insert(key.into(), class);
  }

  /// Resolve the class for `key`. Backup keys resolve through their primary.
  pub fn resolve(&self, key: &str) -> Result<EntityClass, ValidationError> {
    let primary = key.strip_suffix(BACKUP_SUFFIX).unwrap_or(key);
    self
      .classes
      .get(primary)
      .copied()
      .ok_or_else(|| ValidationError::UnregisteredKey(key.to_string()))
  }

  /// Validate `values` against the schema registered for `key`.
  pub fn validate(&self, key: &str, values: &[Value]) -> Result<(), ValidationError> {
    let class = self.resolve(key)?;
    validate_collection(class, values)
  }
}

/// Validate every entity and check that ids are unique.
pub fn validate_collection(class: EntityClass, values: &[Value]) -> Result<(), ValidationError> {
  let mut seen = HashSet::with_capacity(values.len());
  for (index, value) in values.iter().enumerate() {
    let obj = value
      .as_object()
      .ok_or(ValidationError::NotAnObject { index })?;
    validate_object(class, obj)?;
    let id = field_str(obj, "id").unwrap_or_default();
    if !seen.insert(id) {
      return Err(ValidationError::DuplicateId(id.to_string()));
    }
  }
  Ok(())
}

/// Validate a single entity.
pub fn validate_entity(class: EntityClass, value: &Value) -> Result<(), ValidationError> {
  let obj = value
    .as_object()
    .ok_or(ValidationError::NotAnObject { index: 0 })?;
  validate_object(class, obj)
}

fn validate_object(class: EntityClass, obj: &Map<String, Value>) -> Result<(), ValidationError> {
  let id = require_str(obj, "<unknown>", "id")?;

  match class {
    EntityClass::Task => {
      require_str(obj, id, "title")?;
      require_timestamp(obj, id, "createdAt")?;
      require_timestamp(obj, id, "updatedAt")?;
      optional_enum(obj, id, "status", TASK_STATUSES)?;
      optional_enum(obj, id, "priority", TASK_PRIORITIES)?;
      optional_timestamp(obj, id, "dueDate")?;
    }
    EntityClass::Note => {
      require_str(obj, id, "title")?;
      require_timestamp(obj, id, "createdAt")?;
      require_timestamp(obj, id, "updatedAt")?;
      if let Some(tags) = obj.get("tags") {
        let all_strings = tags
          .as_array()
          .is_some_and(|items| items.iter().all(Value::is_string));
        if !all_strings {
          return Err(invalid(id, "tags", "expected an array of strings"));
        }
      }
    }
    EntityClass::Service => {
      require_str(obj, id, "name")?;
      require_enum(obj, id, "status", SERVICE_STATUSES)?;
      optional_timestamp(obj, id, "createdAt")?;
      optional_timestamp(obj, id, "updatedAt")?;
    }
    EntityClass::Device => {
      require_str(obj, id, "name")?;
      require_str(obj, id, "deviceType")?;
      let ip = require_str(obj, id, "ip")?;
      if ip.parse::<IpAddr>().is_err() {
        return Err(invalid(id, "ip", format!("'{}' is not an IP address", ip)));
      }
      optional_bool(obj, id, "online")?;
      optional_timestamp(obj, id, "lastSeen")?;
      optional_timestamp(obj, id, "createdAt")?;
      optional_timestamp(obj, id, "updatedAt")?;
    }
    EntityClass::Automation => {
      require_str(obj, id, "name")?;
      require_str(obj, id, "trigger")?;
      require_str(obj, id, "action")?;
      match obj.get("enabled") {
        Some(Value::Bool(_)) => {}
        Some(_) => return Err(invalid(id, "enabled", "expected a boolean")),
        None => {
          return Err(ValidationError::MissingField {
            id: id.to_string(),
            field: "enabled",
          })
        }
      }
      optional_timestamp(obj, id, "lastRun")?;
      optional_timestamp(obj, id, "createdAt")?;
      optional_timestamp(obj, id, "updatedAt")?;
    }
  }

  Ok(())
}

fn field_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
  obj.get(field).and_then(Value::as_str)
}

fn invalid(id: &str, field: &'static str, reason: impl Into<String>) -> ValidationError {
  ValidationError::InvalidField {
    id: id.to_string(),
    field,
    reason: reason.into(),
  }
}

fn require_str<'a>(
  obj: &'a Map<String, Value>,
  id: &str,
  field: &'static str,
) -> Result<&'a str, ValidationError> {
  match field_str(obj, field) {
    Some(s) if !s.trim().is_empty() => Ok(s),
    _ => Err(ValidationError::MissingField {
      id: id.to_string(),
      field,
    }),
  }
}

fn require_timestamp(
  obj: &Map<String, Value>,
  id: &str,
  field: &'static str,
) -> Result<(), ValidationError> {
  let raw = require_str(obj, id, field)?;
  DateTime::parse_from_rfc3339(raw)
    .map(|_| ())
    .map_err(|e| invalid(id, field, format!("'{}' is not ISO-8601: {}", raw, e)))
}

fn optional_timestamp(
  obj: &Map<String, Value>,
  id: &str,
  field: &'static str,
) -> Result<(), ValidationError> {
  match obj.get(field) {
    None | Some(Value::Null) => Ok(()),
    Some(_) => require_timestamp(obj, id, field),
  }
}

fn require_enum(
  obj: &Map<String, Value>,
  id: &str,
  field: &'static str,
  allowed: &[&str],
) -> Result<(), ValidationError> {
  let raw = require_str(obj, id, field)?;
  if allowed.contains(&raw) {
    Ok(())
  } else {
    Err(invalid(
      id,
      field,
      format!("'{}' is not one of {}", raw, allowed.join(", ")),
    ))
  }
}

fn optional_enum(
  obj: &Map<String, Value>,
  id: &str,
  field: &'static str,
  allowed: &[&str],
) -> Result<(), ValidationError> {
  match obj.get(field) {
    None => Ok(()),
    Some(_) => require_enum(obj, id, field, allowed),
  }
}

fn optional_bool(
  obj: &Map<String, Value>,
  id: &str,
  field: &'static str,
) -> Result<(), ValidationError> {
  match obj.get(field) {
    None | Some(Value::Bool(_)) => Ok(()),
    Some(_) => Err(invalid(id, field, "expected a boolean")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn task(id: &str) -> Value {
    json!({
      "id": id,
      "title": "Buy milk",
      "createdAt": "2024-01-01T00:00:00Z",
      "updatedAt": "2024-01-01T00:00:00Z"
    })
  }

  #[test]
  fn test_valid_task_collection() {
    let registry = ValidatorRegistry::default();
    assert!(registry.validate("tasks", &[task("1"), task("2")]).is_ok());
  }

  #[test]
  fn test_missing_title_rejected() {
    let mut value = task("1");
    value.as_object_mut().unwrap().remove("title");
    let err = validate_collection(EntityClass::Task, &[value]).unwrap_err();
    assert_eq!(
      err,
      ValidationError::MissingField {
        id: "1".to_string(),
        field: "title"
      }
    );
  }

  #[test]
  fn test_bad_timestamp_rejected() {
    let mut value = task("1");
    value["updatedAt"] = json!("yesterday");
    assert!(matches!(
      validate_entity(EntityClass::Task, &value),
      Err(ValidationError::InvalidField {
        field: "updatedAt",
        ..
      })
    ));
  }

  #[test]
  fn test_duplicate_ids_rejected() {
    let err = validate_collection(EntityClass::Task, &[task("1"), task("1")]).unwrap_err();
    assert_eq!(err, ValidationError::DuplicateId("1".to_string()));
  }

  #[test]
  fn test_non_object_rejected() {
    let err = validate_collection(EntityClass::Note, &[json!("oops")]).unwrap_err();
    assert_eq!(err, ValidationError::NotAnObject { index: 0 });
  }

  #[test]
  fn test_unregistered_key() {
    let registry = ValidatorRegistry::default();
    assert_eq!(
      registry.resolve("bookmarks"),
      Err(ValidationError::UnregisteredKey("bookmarks".to_string()))
    );
  }

  #[test]
  fn test_backup_key_resolves_through_primary() {
    let registry = ValidatorRegistry::default();
    assert_eq!(registry.resolve("tasks_backup"), Ok(EntityClass::Task));
  }

  #[test]
  fn test_device_requires_ip_address() {
    let device = json!({
      "id": "d1",
      "name": "nas",
      "ip": "not-an-ip",
      "deviceType": "server"
    });
    assert!(matches!(
      validate_entity(EntityClass::Device, &device),
      Err(ValidationError::InvalidField { field: "ip", .. })
    ));
  }

  #[test]
  fn test_automation_requires_enabled_flag() {
    let rule = json!({
      "id": "r1",
      "name": "nightly backup",
      "trigger": "cron:0 3 * * *",
      "action": "backup:nas"
    });
    assert_eq!(
      validate_entity(EntityClass::Automation, &rule),
      Err(ValidationError::MissingField {
        id: "r1".to_string(),
        field: "enabled"
      })
    );
  }

  #[test]
  fn test_service_status_must_be_known() {
    let service = json!({ "id": "s1", "name": "plex", "status": "sleeping" });
    assert!(validate_entity(EntityClass::Service, &service).is_err());
    let service = json!({ "id": "s1", "name": "plex", "status": "running" });
    assert!(validate_entity(EntityClass::Service, &service).is_ok());
  }
}
