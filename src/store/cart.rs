//! Local state store for the cart session.
//!
//! Owns the durable cart state, its metadata, and a bounded recovery
//! history. Every mutation is a read-modify-write against the key-value
//! medium, persisted write-through. When the medium is unavailable the
//! store degrades to no-ops (`false`/`None`) instead of surfacing errors.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::kv::KvStore;
use super::types::{
  CartItem, CartMetadata, CartState, HistoryEntry, ProductSnapshot, SnapshotDocument,
  HISTORY_LIMIT,
};

const KEY_CART: &str = "cart/state";
const KEY_METADATA: &str = "cart/metadata";
const KEY_HISTORY: &str = "cart/history";

/// Durable store for the active cart session.
pub struct CartStore<K: KvStore> {
  kv: Arc<K>,
  employee_id: Option<String>,
  location: Option<String>,
  storage_warned: AtomicBool,
}

impl<K: KvStore> CartStore<K> {
  pub fn new(kv: Arc<K>) -> Self {
    Self {
      kv,
      employee_id: None,
      location: None,
      storage_warned: AtomicBool::new(false),
    }
  }

  /// Attribute new sessions to an employee.
  pub fn with_employee(mut self, employee_id: Option<String>) -> Self {
    self.employee_id = employee_id;
    self
  }

  /// Attribute new sessions to a store location.
  pub fn with_location(mut self, location: Option<String>) -> Self {
    self.location = location;
    self
  }

  // ===== Reads =====

  /// Load the current session.
  ///
  /// Returns `None` when no session exists or the stored session has
  /// outlived the retention window; an expired record is purged as a side
  /// effect of the read. A successful load refreshes
  /// `metadata.last_accessed_at`.
  pub fn load(&self) -> Option<CartState> {
    let raw = match self.kv.get(KEY_CART) {
      Ok(raw) => raw?,
      Err(e) => {
        self.note_storage_error("load cart", &e);
        return None;
      }
    };

    let state: CartState = match serde_json::from_str(&raw) {
      Ok(state) => state,
      Err(e) => {
        warn!(error = %e, "Discarding unreadable cart record");
        let _ = self.kv.delete(KEY_CART);
        return None;
      }
    };

    if state.is_expired(Utc::now()) {
      debug!(
        session = %state.session_id,
        age_days = state.age_days(Utc::now()),
        "Purging expired cart session"
      );
      let _ = self.kv.delete(KEY_CART);
      let _ = self.kv.delete(KEY_METADATA);
      return None;
    }

    self.touch_metadata();
    Some(state)
  }

  /// Current session metadata, if a session exists.
  pub fn metadata(&self) -> Option<CartMetadata> {
    let raw = self.kv.get(KEY_METADATA).ok()??;
    serde_json::from_str(&raw).ok()
  }

  /// Recovery history, oldest first. Never more than `HISTORY_LIMIT` entries.
  pub fn history(&self) -> Vec<HistoryEntry> {
    let raw = match self.kv.get(KEY_HISTORY) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        self.note_storage_error("load history", &e);
        return Vec::new();
      }
    };
    serde_json::from_str(&raw).unwrap_or_default()
  }

  // ===== Mutations =====

  /// Add `quantity` of a product to the cart.
  ///
  /// An existing line for the same product id has its quantity summed and
  /// its notes overwritten only when `notes` is provided; otherwise a new
  /// line is appended. Creates the session on first use.
  pub fn add_item(&self, product: &ProductSnapshot, quantity: u32, notes: Option<&str>) -> bool {
    if quantity == 0 {
      return false;
    }

    let mut state = self.load_or_new();

    match state.items.iter_mut().find(|i| i.id == product.id) {
      Some(item) => {
        item.quantity += quantity;
        if let Some(notes) = notes {
          item.notes = Some(notes.to_string());
        }
      }
      None => {
        state.items.push(CartItem {
          id: product.id.clone(),
          product: product.clone(),
          quantity,
          added_at: Utc::now(),
          notes: notes.map(String::from),
        });
      }
    }

    self.persist(state)
  }

  /// Remove a line from the cart. Returns `false` when the line (or the
  /// session) does not exist.
  pub fn remove_item(&self, id: &str) -> bool {
    let mut state = match self.load() {
      Some(state) => state,
      None => return false,
    };

    let before = state.items.len();
    state.items.retain(|i| i.id != id);
    if state.items.len() == before {
      return false;
    }

    self.persist(state)
  }

  /// Set the quantity of an existing line. A quantity of zero removes it.
  pub fn set_quantity(&self, id: &str, quantity: u32) -> bool {
    if quantity == 0 {
      return self.remove_item(id);
    }

    let mut state = match self.load() {
      Some(state) => state,
      None => return false,
    };

    match state.items.iter_mut().find(|i| i.id == id) {
      Some(item) => item.quantity = quantity,
      None => return false,
    }

    self.persist(state)
  }

  /// Drop the current session and its metadata. History is kept so the
  /// session stays recoverable.
  pub fn clear(&self) -> bool {
    if let Err(e) = self.kv.delete(KEY_CART) {
      self.note_storage_error("clear cart", &e);
      return false;
    }
    let _ = self.kv.delete(KEY_METADATA);
    true
  }

  // ===== Export / import =====

  /// Serialize the session, its metadata, and the recovery history into a
  /// self-contained JSON document.
  pub fn export_snapshot(&self) -> Option<String> {
    let document = SnapshotDocument {
      current: self.load(),
      metadata: self.metadata(),
      history: self.history(),
      exported_at: Utc::now(),
      version: env!("CARGO_PKG_VERSION").to_string(),
    };

    match serde_json::to_string_pretty(&document) {
      Ok(json) => Some(json),
      Err(e) => {
        warn!(error = %e, "Failed to serialize snapshot");
        None
      }
    }
  }

  /// Replace the session from an exported document.
  ///
  /// The payload must be a JSON object whose top level carries a `current`
  /// key; anything else is rejected wholesale with zero side effects. On
  /// acceptance the cart, metadata, and history are replaced together.
  pub fn import_snapshot(&self, payload: &str) -> bool {
    let value: serde_json::Value = match serde_json::from_str(payload) {
      Ok(value) => value,
      Err(_) => return false,
    };

    let has_current = value
      .as_object()
      .map(|o| o.contains_key("current"))
      .unwrap_or(false);
    if !has_current {
      return false;
    }

    let document: SnapshotDocument = match serde_json::from_value(value) {
      Ok(document) => document,
      Err(_) => return false,
    };

    let mut entries: Vec<(&str, String)> = Vec::new();
    let mut removals: Vec<&str> = Vec::new();

    match &document.current {
      Some(state) => match serde_json::to_string(state) {
        Ok(json) => entries.push((KEY_CART, json)),
        Err(_) => return false,
      },
      None => removals.push(KEY_CART),
    }

    match &document.metadata {
      Some(metadata) => match serde_json::to_string(metadata) {
        Ok(json) => entries.push((KEY_METADATA, json)),
        Err(_) => return false,
      },
      None => removals.push(KEY_METADATA),
    }

    match serde_json::to_string(&document.history) {
      Ok(json) => entries.push((KEY_HISTORY, json)),
      Err(_) => return false,
    }

    if let Err(e) = self.kv.put_many(&entries) {
      self.note_storage_error("import snapshot", &e);
      return false;
    }
    for key in removals {
      let _ = self.kv.delete(key);
    }

    true
  }

  // ===== Internals =====

  fn load_or_new(&self) -> CartState {
    self
      .load()
      .unwrap_or_else(|| CartState::new(self.employee_id.clone(), self.location.clone()))
  }

  /// Write the state back, together with an updated history ring and the
  /// session metadata, in a single storage transaction.
  fn persist(&self, mut state: CartState) -> bool {
    state.recompute_totals();
    state.last_updated = Utc::now();

    let mut history = self.history();
    history.push(HistoryEntry {
      saved_at: state.last_updated,
      state: state.clone(),
    });
    if history.len() > HISTORY_LIMIT {
      let excess = history.len() - HISTORY_LIMIT;
      history.drain(..excess);
    }

    let metadata = self.metadata().unwrap_or_default();

    let cart_json = match serde_json::to_string(&state) {
      Ok(json) => json,
      Err(e) => {
        warn!(error = %e, "Failed to serialize cart state");
        return false;
      }
    };
    let history_json = serde_json::to_string(&history).unwrap_or_else(|_| "[]".to_string());
    let metadata_json = match serde_json::to_string(&metadata) {
      Ok(json) => json,
      Err(_) => return false,
    };

    let entries = [
      (KEY_CART, cart_json),
      (KEY_HISTORY, history_json),
      (KEY_METADATA, metadata_json),
    ];

    match self.kv.put_many(&entries) {
      Ok(()) => true,
      Err(e) => {
        self.note_storage_error("persist cart", &e);
        false
      }
    }
  }

  fn touch_metadata(&self) {
    let mut metadata = self.metadata().unwrap_or_default();
    metadata.last_accessed_at = Utc::now();
    if let Ok(json) = serde_json::to_string(&metadata) {
      let _ = self.kv.put(KEY_METADATA, &json);
    }
  }

  /// Storage failures are logged once per store instance at warn level,
  /// then demoted to debug to avoid flooding the log while the medium
  /// stays unavailable.
  fn note_storage_error(&self, context: &str, error: &color_eyre::Report) {
    if !self.storage_warned.swap(true, Ordering::Relaxed) {
      warn!(context, error = %error, "Storage unavailable; cart operations degraded to no-ops");
    } else {
      debug!(context, error = %error, "Storage still unavailable");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::kv::MemoryKv;
  use color_eyre::eyre::eyre;
  use color_eyre::Result;

  fn store() -> CartStore<MemoryKv> {
    CartStore::new(Arc::new(MemoryKv::new()))
  }

  fn product(id: &str, price: f64) -> ProductSnapshot {
    ProductSnapshot {
      id: id.to_string(),
      name: format!("Product {}", id),
      price,
      sku: None,
      category: None,
    }
  }

  /// Medium that rejects every operation, to exercise degraded mode.
  struct BrokenKv;

  impl KvStore for BrokenKv {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Err(eyre!("medium offline"))
    }
    fn put(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("medium offline"))
    }
    fn delete(&self, _key: &str) -> Result<()> {
      Err(eyre!("medium offline"))
    }
  }

  #[test]
  fn test_add_item_creates_session() {
    let store = store();
    assert!(store.load().is_none());

    assert!(store.add_item(&product("a", 2.0), 1, None));

    let state = store.load().unwrap();
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.total_items, 1);
    assert!((state.total_value - 2.0).abs() < f64::EPSILON);
    assert!(store.metadata().is_some());
  }

  #[test]
  fn test_add_same_product_merges_quantity() {
    let store = store();
    store.add_item(&product("a", 2.0), 2, None);
    store.add_item(&product("a", 2.0), 3, None);

    let state = store.load().unwrap();
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].quantity, 5);
    assert_eq!(state.total_items, 5);
  }

  #[test]
  fn test_merge_keeps_notes_unless_provided() {
    let store = store();
    store.add_item(&product("a", 2.0), 1, Some("gift wrap"));
    store.add_item(&product("a", 2.0), 1, None);

    let state = store.load().unwrap();
    assert_eq!(state.items[0].notes.as_deref(), Some("gift wrap"));

    store.add_item(&product("a", 2.0), 1, Some("no wrap"));
    let state = store.load().unwrap();
    assert_eq!(state.items[0].notes.as_deref(), Some("no wrap"));
  }

  #[test]
  fn test_zero_quantity_add_is_rejected() {
    let store = store();
    assert!(!store.add_item(&product("a", 2.0), 0, None));
    assert!(store.load().is_none());
  }

  #[test]
  fn test_totals_track_any_mutation_sequence() {
    let store = store();
    store.add_item(&product("a", 1.5), 2, None);
    store.add_item(&product("b", 3.0), 1, None);
    store.add_item(&product("c", 0.5), 4, None);
    store.set_quantity("a", 5);
    store.remove_item("b");
    store.set_quantity("c", 0);

    let state = store.load().unwrap();
    let expected: u32 = state.items.iter().map(|i| i.quantity).sum();
    assert_eq!(state.total_items, expected);
    assert_eq!(state.total_items, 5);
    assert_eq!(state.items.len(), 1);
    assert!((state.total_value - 7.5).abs() < 1e-9);
  }

  #[test]
  fn test_set_quantity_zero_removes_line() {
    let store = store();
    store.add_item(&product("a", 1.0), 2, None);
    assert!(store.set_quantity("a", 0));

    let state = store.load().unwrap();
    assert!(state.items.is_empty());
    assert_eq!(state.total_items, 0);
  }

  #[test]
  fn test_remove_missing_item_returns_false() {
    let store = store();
    store.add_item(&product("a", 1.0), 1, None);
    assert!(!store.remove_item("zzz"));
    assert!(!store.set_quantity("zzz", 3));
  }

  #[test]
  fn test_clear_keeps_history() {
    let store = store();
    store.add_item(&product("a", 1.0), 1, None);
    store.add_item(&product("b", 1.0), 1, None);

    assert!(store.clear());
    assert!(store.load().is_none());
    assert!(store.metadata().is_none());
    assert_eq!(store.history().len(), 2);
  }

  #[test]
  fn test_expired_session_is_absent_and_purged() {
    let kv = Arc::new(MemoryKv::new());
    let store = CartStore::new(Arc::clone(&kv));
    store.add_item(&product("a", 1.0), 1, None);

    // Age the stored record past the retention window.
    let raw = kv.get("cart/state").unwrap().unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let old = Utc::now() - chrono::Duration::days(31);
    value["lastUpdated"] = serde_json::json!(old);
    kv.put("cart/state", &value.to_string()).unwrap();

    assert!(store.load().is_none());
    assert!(kv.get("cart/state").unwrap().is_none());
    assert!(kv.get("cart/metadata").unwrap().is_none());
  }

  #[test]
  fn test_history_is_bounded_fifo() {
    let store = store();
    for n in 1..=11 {
      store.add_item(&product("a", 1.0), n, None);
    }

    let history = store.history();
    assert_eq!(history.len(), HISTORY_LIMIT);

    // The first snapshot (quantity 1) was evicted; the ring now starts at
    // the second append and ends at the latest.
    assert_eq!(history[0].state.items[0].quantity, 1 + 2);
    let last = history.last().unwrap();
    assert_eq!(last.state.total_items, (1..=11).sum::<u32>());
  }

  #[test]
  fn test_metadata_created_at_is_stable() {
    let store = store();
    store.add_item(&product("a", 1.0), 1, None);
    let created = store.metadata().unwrap().created_at;

    store.add_item(&product("b", 1.0), 1, None);
    store.load();

    let metadata = store.metadata().unwrap();
    assert_eq!(metadata.created_at, created);
    assert!(metadata.last_accessed_at >= created);
  }

  #[test]
  fn test_export_import_round_trip() {
    let source = store();
    source.add_item(&product("a", 2.5), 2, Some("bag"));
    source.add_item(&product("b", 1.0), 1, None);
    let before = source.load().unwrap();

    let snapshot = source.export_snapshot().unwrap();

    let other = store();
    assert!(other.import_snapshot(&snapshot));

    let after = other.load().unwrap();
    assert_eq!(after.session_id, before.session_id);
    assert_eq!(after.items, before.items);
    assert_eq!(after.total_items, before.total_items);
    assert_eq!(other.history().len(), source.history().len());
  }

  #[test]
  fn test_import_rejects_payload_without_current() {
    let store = store();
    store.add_item(&product("a", 1.0), 3, None);
    let before = store.load().unwrap();

    assert!(!store.import_snapshot(r#"{"not_current":true}"#));
    assert!(!store.import_snapshot("not json"));
    assert!(!store.import_snapshot("[1,2,3]"));

    let after = store.load().unwrap();
    assert_eq!(after.items, before.items);
    assert_eq!(after.total_items, before.total_items);
  }

  #[test]
  fn test_import_with_null_current_clears_session() {
    let store = store();
    store.add_item(&product("a", 1.0), 1, None);

    let payload = serde_json::json!({
      "current": null,
      "metadata": null,
      "history": [],
      "exportedAt": Utc::now(),
      "version": "1.0.0",
    });
    assert!(store.import_snapshot(&payload.to_string()));
    assert!(store.load().is_none());
    assert!(store.history().is_empty());
  }

  #[test]
  fn test_unavailable_storage_degrades_to_noops() {
    let store = CartStore::new(Arc::new(BrokenKv));

    assert!(store.load().is_none());
    assert!(!store.add_item(&product("a", 1.0), 1, None));
    assert!(!store.remove_item("a"));
    assert!(!store.clear());
    assert!(store.history().is_empty());
  }
}
