//! SQLite implementation of the key-value backend.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{check_quota, KvBackend};
use crate::error::StorageError;

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-based key-value backend.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
  quota: Option<usize>,
}

impl SqliteBackend {
  /// Open the backend at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the backend database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open storage database at {}: {}", path.display(), e))?;

    // WAL lets several processes read while one writes
    conn
      .pragma_update(None, "journal_mode", "WAL")
      .map_err(|e| eyre!("Failed to enable WAL journal: {}", e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      quota: None,
    })
  }

  /// Limit the size of any single stored value.
  pub fn with_quota(mut self, bytes: Option<usize>) -> Self {
    self.quota = bytes;
    self
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("store.db"))
  }

  fn lock(&self, key: &str) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|e| StorageError::Read {
      key: key.to_string(),
      message: format!("lock poisoned: {}", e),
    })
  }
}

impl KvBackend for SqliteBackend {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let conn = self.lock(key)?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| StorageError::Read {
        key: key.to_string(),
        message: e.to_string(),
      })
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    check_quota(key, value, self.quota)?;
    let conn = self.lock(key)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, written_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| StorageError::Write {
        key: key.to_string(),
        message: e.to_string(),
      })?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    let conn = self.lock(key)?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| StorageError::Write {
        key: key.to_string(),
        message: e.to_string(),
      })?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_remove() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    assert_eq!(backend.get("tasks").unwrap(), None);

    backend.set("tasks", "[]").unwrap();
    assert_eq!(backend.get("tasks").unwrap().as_deref(), Some("[]"));

    backend.set("tasks", "[1]").unwrap();
    assert_eq!(backend.get("tasks").unwrap().as_deref(), Some("[1]"));

    backend.remove("tasks").unwrap();
    assert_eq!(backend.get("tasks").unwrap(), None);
    // Removing again is fine
    backend.remove("tasks").unwrap();
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
      let backend = SqliteBackend::open(&path).unwrap();
      backend.set("notes", "{\"data\":[]}").unwrap();
    }

    let backend = SqliteBackend::open(&path).unwrap();
    assert_eq!(
      backend.get("notes").unwrap().as_deref(),
      Some("{\"data\":[]}")
    );
  }

  #[test]
  fn test_quota_rejects_large_values() {
    let backend = SqliteBackend::open_in_memory()
      .unwrap()
      .with_quota(Some(4));
    assert!(matches!(
      backend.set("tasks", "0123456789"),
      Err(StorageError::QuotaExceeded { limit: 4, .. })
    ));
    assert_eq!(backend.get("tasks").unwrap(), None);
  }
}
