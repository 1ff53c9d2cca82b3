//! Durable cart session types.
//!
//! These are the records persisted by the local state store. Field names
//! serialize in camelCase so exported snapshots stay readable by the
//! dashboard tooling that consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of days a saved session stays loadable. Older sessions are
/// treated as absent and purged on the next read.
pub const RETENTION_DAYS: i64 = 30;

/// Maximum number of recovery snapshots retained per session (FIFO).
pub const HISTORY_LIMIT: usize = 10;

/// Denormalized copy of a product taken at the moment it is added to the
/// cart, so the cart stays renderable when the catalog is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
  pub id: String,
  pub name: String,
  pub price: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
}

/// A single line in the cart. `id` is the product id and is unique within
/// a cart; adding the same product again merges quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub id: String,
  pub product: ProductSnapshot,
  pub quantity: u32,
  pub added_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

/// The active cart session. `total_items` and `total_value` are derived
/// from `items` and recomputed on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
  pub items: Vec<CartItem>,
  pub total_items: u32,
  pub total_value: f64,
  pub last_updated: DateTime<Utc>,
  pub session_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub employee_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

impl CartState {
  /// Create an empty session with a fresh id.
  pub fn new(employee_id: Option<String>, location: Option<String>) -> Self {
    Self {
      items: Vec::new(),
      total_items: 0,
      total_value: 0.0,
      last_updated: Utc::now(),
      session_id: uuid::Uuid::new_v4().to_string(),
      employee_id,
      location,
    }
  }

  /// Recompute the derived totals from the item list.
  pub fn recompute_totals(&mut self) {
    self.total_items = self.items.iter().map(|i| i.quantity).sum();
    self.total_value = self
      .items
      .iter()
      .map(|i| i.product.price * i.quantity as f64)
      .sum();
  }

  /// Age of the session relative to `now`.
  pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
    (now - self.last_updated).num_days()
  }

  /// Whether the session has outlived the retention window.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.age_days(now) >= RETENTION_DAYS
  }
}

/// Bookkeeping for the active session, 1:1 with the cart record.
/// `created_at` is fixed for the session's lifetime; `last_accessed_at`
/// is refreshed on every load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMetadata {
  pub version: String,
  pub created_at: DateTime<Utc>,
  pub last_accessed_at: DateTime<Utc>,
  pub device_info: String,
}

impl CartMetadata {
  pub fn new() -> Self {
    let now = Utc::now();
    Self {
      version: env!("CARGO_PKG_VERSION").to_string(),
      created_at: now,
      last_accessed_at: now,
      device_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    }
  }
}

impl Default for CartMetadata {
  fn default() -> Self {
    Self::new()
  }
}

/// Immutable snapshot of the cart taken at save time. Used only for
/// recovery, never for authoritative reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub saved_at: DateTime<Utc>,
  pub state: CartState,
}

/// The export/import document. Import rejects any payload whose top level
/// is missing the `current` key, without partial effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
  pub current: Option<CartState>,
  #[serde(default)]
  pub metadata: Option<CartMetadata>,
  #[serde(default)]
  pub history: Vec<HistoryEntry>,
  pub exported_at: DateTime<Utc>,
  pub version: String,
}
