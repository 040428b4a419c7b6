//! The persisted envelope around a collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Current envelope version written by this crate.
pub const STORAGE_VERSION: u32 = 1;

/// `{ data, timestamp, version, checksum }` as stored under a logical key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
  pub data: Vec<Value>,
  pub timestamp: DateTime<Utc>,
  pub version: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checksum: Option<String>,
}

impl StorageRecord {
  /// Wrap `data` in a current-version envelope stamped now.
  pub fn new(data: Vec<Value>) -> Result<Self, serde_json::Error> {
    let checksum = checksum(&data)?;
    Ok(Self {
      data,
      timestamp: Utc::now(),
      version: STORAGE_VERSION,
      checksum: Some(checksum),
    })
  }

  pub fn encode(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }

  /// Parse a stored value, migrating older layouts.
  ///
  /// Version 0 is the pre-envelope layout: a bare JSON array of entities.
  pub fn decode(raw: &str) -> Result<Self, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;

    if let Value::Array(data) = value {
      return Ok(Self {
        data,
        timestamp: Utc::now(),
        version: 0,
        checksum: None,
      });
    }

    let record: StorageRecord =
      serde_json::from_value(value).map_err(|e| format!("invalid envelope: {}", e))?;

    if record.version > STORAGE_VERSION {
      return Err(format!(
        "record version {} is newer than supported version {}",
        record.version, STORAGE_VERSION
      ));
    }

    if let Some(expected) = &record.checksum {
      let actual = checksum(&record.data).map_err(|e| e.to_string())?;
      if &actual != expected {
        return Err("checksum mismatch".to_string());
      }
    }

    Ok(record)
  }
}

/// Hex SHA-256 over the canonical serialization of `data`.
fn checksum(data: &[Value]) -> Result<String, serde_json::Error> {
  let bytes = serde_json::to_vec(data)?;
  let mut hasher = Sha256::new();
  hasher.update(&bytes);
  Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_encode_decode() {
    let record = StorageRecord::new(vec![json!({"id": "1"})]).unwrap();
    let decoded = StorageRecord::decode(&record.encode().unwrap()).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(decoded.version, STORAGE_VERSION);
  }

  #[test]
  fn test_bare_array_is_version_zero() {
    let decoded = StorageRecord::decode(r#"[{"id":"1"}]"#).unwrap();
    assert_eq!(decoded.version, 0);
    assert_eq!(decoded.data, vec![json!({"id": "1"})]);
  }

  #[test]
  fn test_tampered_data_fails_checksum() {
    let record = StorageRecord::new(vec![json!({"id": "1"})]).unwrap();
    let raw = record.encode().unwrap().replace("\"1\"", "\"2\"");
    assert_eq!(
      StorageRecord::decode(&raw).unwrap_err(),
      "checksum mismatch"
    );
  }

  #[test]
  fn test_future_version_rejected() {
    let raw = r#"{"data":[],"timestamp":"2024-01-01T00:00:00Z","version":9}"#;
    assert!(StorageRecord::decode(raw).is_err());
  }

  #[test]
  fn test_truncated_json_rejected() {
    assert!(StorageRecord::decode(r#"{"data":[{"id":"#).is_err());
  }
}
