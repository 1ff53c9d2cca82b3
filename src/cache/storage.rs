//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheClass, CacheStats};

/// A stored response for one canonical path.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub body: Value,
  pub class: CacheClass,
  pub cached_at: DateTime<Utc>,
}

/// Storage backend for cached responses, keyed by canonical request path.
/// Entries are superseded by the next successful store for the same path,
/// never deleted individually; `clear` wipes everything.
pub trait CacheStorage: Send + Sync {
  fn get(&self, path: &str) -> Result<Option<CachedEntry>>;

  fn put(&self, path: &str, class: CacheClass, body: &Value) -> Result<()>;

  fn stats(&self) -> Result<CacheStats>;

  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
#[allow(dead_code)]
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _path: &str) -> Result<Option<CachedEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, _path: &str, _class: CacheClass, _body: &Value) -> Result<()> {
    Ok(()) // Discard
  }

  fn stats(&self) -> Result<CacheStats> {
    Ok(CacheStats::default())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    path_hash TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    class TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_class ON response_cache(class);
"#;

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// In-memory cache, used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }

  /// Rewrite an entry's timestamp, for staleness tests.
  #[cfg(test)]
  pub fn backdate(&self, path: &str, cached_at: DateTime<Utc>) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    conn
      .execute(
        "UPDATE response_cache SET cached_at = ? WHERE path_hash = ?",
        params![cached_at.to_rfc3339(), path_hash(path)],
      )
      .map_err(|e| eyre!("Failed to backdate entry: {}", e))?;
    Ok(())
  }
}

/// Stable, fixed-length storage key for a canonical path.
fn path_hash(path: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStorage for SqliteStorage {
  fn get(&self, path: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT body, class, cached_at FROM response_cache WHERE path_hash = ?")
      .map_err(|e| eyre!("Failed to prepare cache read: {}", e))?;

    let row: Option<(Vec<u8>, String, String)> = stmt
      .query_row(params![path_hash(path)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .ok();

    match row {
      Some((body, class, cached_at)) => {
        let body: Value = serde_json::from_slice(&body)
          .map_err(|e| eyre!("Failed to deserialize cached body: {}", e))?;
        let class: CacheClass = serde_json::from_value(Value::String(class))
          .map_err(|e| eyre!("Unknown cache class: {}", e))?;
        let cached_at = DateTime::parse_from_rfc3339(&cached_at)
          .map_err(|e| eyre!("Failed to parse cached_at: {}", e))?
          .with_timezone(&Utc);

        Ok(Some(CachedEntry {
          body,
          class,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, path: &str, class: CacheClass, body: &Value) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data = serde_json::to_vec(body).map_err(|e| eyre!("Failed to serialize body: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (path_hash, path, class, body, cached_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          path_hash(path),
          path,
          class.as_str(),
          data,
          Utc::now().to_rfc3339()
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn stats(&self) -> Result<CacheStats> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT class, COUNT(*) FROM response_cache GROUP BY class")
      .map_err(|e| eyre!("Failed to prepare stats query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
      })
      .map_err(|e| eyre!("Failed to query stats: {}", e))?;

    let mut stats = CacheStats::default();
    for row in rows.flatten() {
      let (class, count) = row;
      match class.as_str() {
        "products" | "employees" => stats.api += count,
        "static" => stats.static_entries += count,
        _ => stats.main += count,
      }
      stats.total += count;
    }

    Ok(stats)
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    conn
      .execute("DELETE FROM response_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }
}
