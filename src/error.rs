//! Error taxonomy for the store, sync and remote layers.
//!
//! Only [`ValidationError`] and [`StorageError`] ever reach callers, wrapped in
//! [`StoreError`]. Remote failures are absorbed by retries or simulated data.

use thiserror::Error;

/// A collection or entity failed structural validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("no validator registered for key '{0}'")]
  UnregisteredKey(String),
  #[error("entity at index {index} is not a JSON object")]
  NotAnObject { index: usize },
  #[error("entity '{id}': missing or empty required field '{field}'")]
  MissingField { id: String, field: &'static str },
  #[error("entity '{id}': field '{field}' is invalid: {reason}")]
  InvalidField {
    id: String,
    field: &'static str,
    reason: String,
  },
  #[error("duplicate entity id '{0}'")]
  DuplicateId(String),
  #[error("patch for entity '{id}' is invalid: {reason}")]
  InvalidPatch { id: String, reason: String },
}

/// The key-value backend failed to read, write or (de)serialize.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
  #[error("backend read of '{key}' failed: {message}")]
  Read { key: String, message: String },
  #[error("backend write of '{key}' failed: {message}")]
  Write { key: String, message: String },
  #[error("quota exceeded writing '{key}' ({size} bytes, limit {limit})")]
  QuotaExceeded {
    key: String,
    size: usize,
    limit: usize,
  },
  #[error("serialization for '{key}' failed: {message}")]
  Serialize { key: String, message: String },
}

/// Anything a store write can surface to a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Storage(#[from] StorageError),
}

/// A single remote attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
  #[error("request to {endpoint} timed out after {timeout_ms} ms")]
  Timeout { endpoint: String, timeout_ms: u64 },
  #[error("request to {endpoint} returned HTTP {status}")]
  Http { endpoint: String, status: u16 },
  #[error("request to {endpoint} failed: {message}")]
  Transport { endpoint: String, message: String },
  #[error("response from {endpoint} could not be decoded: {message}")]
  Decode { endpoint: String, message: String },
}

/// A change signal from another context carried an unreadable payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("change signal for '{key}' is malformed: {message}")]
pub struct ReconciliationParseError {
  pub key: String,
  pub message: String,
}
