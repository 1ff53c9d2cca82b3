//! Offline mutation queue.
//!
//! Mutations performed while disconnected are persisted here as a FIFO
//! list and replayed in enqueue order once connectivity returns. Replay of
//! an item is attempted once per drain; after `MAX_RETRIES` failed
//! attempts the item is dropped with a warning rather than retried
//! forever. There is no dead-letter record of dropped items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::store::kv::KvStore;
use crate::store::types::{CartItem, CartState};

const KEY_QUEUE: &str = "sync/queue";

/// An item is dropped after this many failed replay attempts.
pub const MAX_RETRIES: u32 = 3;

/// A queued mutation, tagged the way the backend sync endpoints expect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum QueueOp {
  #[serde(rename_all = "camelCase")]
  CartAdd { item: CartItem },
  #[serde(rename_all = "camelCase")]
  CartUpdate { product_id: String, quantity: u32 },
  #[serde(rename_all = "camelCase")]
  CartRemove { product_id: String },
  #[serde(rename_all = "camelCase")]
  Checkout { cart: CartState },
}

impl QueueOp {
  /// Short label for logs.
  pub fn kind(&self) -> &'static str {
    match self {
      QueueOp::CartAdd { .. } => "cart_add",
      QueueOp::CartUpdate { .. } => "cart_update",
      QueueOp::CartRemove { .. } => "cart_remove",
      QueueOp::Checkout { .. } => "checkout",
    }
  }
}

/// A persisted queue entry. `retry_count` only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
  pub id: String,
  #[serde(flatten)]
  pub op: QueueOp,
  pub enqueued_at: DateTime<Utc>,
  pub retry_count: u32,
}

/// Result of a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
  /// Items replayed successfully and removed.
  pub processed: usize,
  /// Items still pending after the pass (dropped items count in neither).
  pub remaining: usize,
}

/// Persisted FIFO of mutations awaiting replay.
pub struct OfflineQueue<K: KvStore> {
  kv: Arc<K>,
  draining: AtomicBool,
  storage_warned: AtomicBool,
}

impl<K: KvStore> OfflineQueue<K> {
  pub fn new(kv: Arc<K>) -> Self {
    Self {
      kv,
      draining: AtomicBool::new(false),
      storage_warned: AtomicBool::new(false),
    }
  }

  /// Append a mutation to the queue. Returns the new item's id, or `None`
  /// when the storage medium is unavailable.
  pub fn enqueue(&self, op: QueueOp) -> Option<String> {
    let mut items = self.items();
    let item = QueueItem {
      id: uuid::Uuid::new_v4().to_string(),
      op,
      enqueued_at: Utc::now(),
      retry_count: 0,
    };
    let id = item.id.clone();
    debug!(id = %id, op = item.op.kind(), "Enqueued offline mutation");
    items.push(item);

    if self.save(&items) {
      Some(id)
    } else {
      None
    }
  }

  /// Pending items in enqueue order.
  pub fn items(&self) -> Vec<QueueItem> {
    let raw = match self.kv.get(KEY_QUEUE) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        self.note_storage_error("load queue", &e);
        return Vec::new();
      }
    };
    serde_json::from_str(&raw).unwrap_or_default()
  }

  pub fn len(&self) -> usize {
    self.items().len()
  }

  pub fn is_empty(&self) -> bool {
    self.items().is_empty()
  }

  /// Replay pending mutations in enqueue order through `apply`.
  ///
  /// A single in-flight flag guards the pass; a concurrent caller gets
  /// back `processed = 0` with the current queue length and does no work.
  /// Per item: success removes it; failure increments `retry_count`, and
  /// an item that reaches `MAX_RETRIES` is dropped with a warning.
  /// Surviving items keep their relative order.
  pub async fn drain<F, Fut>(&self, mut apply: F) -> DrainOutcome
  where
    F: FnMut(QueueOp) -> Fut,
    Fut: Future<Output = Result<(), ApiError>>,
  {
    if self.draining.swap(true, Ordering::SeqCst) {
      debug!("Drain already in flight; skipping");
      return DrainOutcome {
        processed: 0,
        remaining: self.len(),
      };
    }

    let items = self.items();
    let mut survivors: Vec<QueueItem> = Vec::new();
    let mut processed = 0;

    for mut item in items {
      match apply(item.op.clone()).await {
        Ok(()) => {
          debug!(id = %item.id, op = item.op.kind(), "Replayed offline mutation");
          processed += 1;
        }
        Err(e) => {
          item.retry_count += 1;
          if item.retry_count >= MAX_RETRIES {
            warn!(
              id = %item.id,
              op = item.op.kind(),
              attempts = item.retry_count,
              error = %e,
              "Dropping offline mutation after exhausting retries"
            );
          } else {
            debug!(
              id = %item.id,
              op = item.op.kind(),
              retry_count = item.retry_count,
              error = %e,
              "Replay failed; keeping item for next drain"
            );
            survivors.push(item);
          }
        }
      }
    }

    let remaining = survivors.len();
    self.save(&survivors);
    self.draining.store(false, Ordering::SeqCst);

    DrainOutcome {
      processed,
      remaining,
    }
  }

  fn save(&self, items: &[QueueItem]) -> bool {
    let json = match serde_json::to_string(items) {
      Ok(json) => json,
      Err(e) => {
        warn!(error = %e, "Failed to serialize queue");
        return false;
      }
    };
    match self.kv.put(KEY_QUEUE, &json) {
      Ok(()) => true,
      Err(e) => {
        self.note_storage_error("persist queue", &e);
        false
      }
    }
  }

  fn note_storage_error(&self, context: &str, error: &color_eyre::Report) {
    if !self.storage_warned.swap(true, Ordering::Relaxed) {
      warn!(context, error = %error, "Storage unavailable; queue operations degraded to no-ops");
    } else {
      debug!(context, error = %error, "Storage still unavailable");
    }
  }
}
