//! Key-value persistence medium backing the store and the sync queue.
//!
//! Every durable record is a JSON document under a namespaced key. External
//! consumers go through the store/queue APIs, never these keys directly.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Storage backend for namespaced JSON records.
pub trait KvStore: Send + Sync {
  /// Fetch the raw document stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous document.
  fn put(&self, key: &str, value: &str) -> Result<()>;

  /// Remove the document under `key`. Removing a missing key is not an error.
  fn delete(&self, key: &str) -> Result<()>;

  /// Store several documents so that no partial write is observable to a
  /// subsequent read. The default implementation writes sequentially;
  /// transactional backends override it.
  fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
    for (key, value) in entries {
      self.put(key, value)?;
    }
    Ok(())
  }
}

/// SQLite-backed key-value store.
pub struct SqliteKv {
  conn: Mutex<Connection>,
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteKv {
  /// Open (or create) the store at `path`, creating parent directories.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// In-memory store, used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;
    Ok(())
  }
}

impl KvStore for SqliteKv {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM kv WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare read: {}", e))?;

    let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(value)
  }

  fn put(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete {}: {}", key, e))?;

    Ok(())
  }

  fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, value) in entries {
      if let Err(e) = conn.execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      ) {
        let _ = conn.execute("ROLLBACK", []);
        return Err(eyre!("Failed to write {}: {}", key, e));
      }
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}

/// Volatile store for tests and ephemeral sessions.
#[allow(dead_code)]
#[derive(Default)]
pub struct MemoryKv {
  map: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
  #[allow(dead_code)]
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStore for MemoryKv {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let map = self.map.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(map.get(key).cloned())
  }

  fn put(&self, key: &str, value: &str) -> Result<()> {
    let mut map = self.map.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    map.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let mut map = self.map.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    map.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_round_trip() {
    let kv = SqliteKv::open_in_memory().unwrap();

    assert_eq!(kv.get("cart/state").unwrap(), None);
    kv.put("cart/state", r#"{"items":[]}"#).unwrap();
    assert_eq!(kv.get("cart/state").unwrap().as_deref(), Some(r#"{"items":[]}"#));

    kv.put("cart/state", r#"{"items":[1]}"#).unwrap();
    assert_eq!(kv.get("cart/state").unwrap().as_deref(), Some(r#"{"items":[1]}"#));

    kv.delete("cart/state").unwrap();
    assert_eq!(kv.get("cart/state").unwrap(), None);
  }

  #[test]
  fn test_delete_missing_key_is_ok() {
    let kv = SqliteKv::open_in_memory().unwrap();
    assert!(kv.delete("never/written").is_ok());
  }

  #[test]
  fn test_put_many_writes_all_keys() {
    let kv = SqliteKv::open_in_memory().unwrap();
    kv.put_many(&[
      ("cart/state", "a".to_string()),
      ("cart/history", "b".to_string()),
    ])
    .unwrap();

    assert_eq!(kv.get("cart/state").unwrap().as_deref(), Some("a"));
    assert_eq!(kv.get("cart/history").unwrap().as_deref(), Some("b"));
  }

  #[test]
  fn test_memory_kv_round_trip() {
    let kv = MemoryKv::new();
    kv.put("k", "v").unwrap();
    assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
    kv.delete("k").unwrap();
    assert_eq!(kv.get("k").unwrap(), None);
  }
}
