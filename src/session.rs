//! Session coordinator.
//!
//! Routes UI mutations through the local store (always) and to the
//! backend: online mutations are pushed immediately and queued only when
//! the push fails; offline mutations go straight to the queue. The
//! connectivity monitor's reconnect edge drains the queue automatically.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{CachedPosClient, Listing, PosClient};
use crate::api::types::{Employee, Product};
use crate::store::kv::KvStore;
use crate::store::types::{CartItem, CartState};
use crate::store::CartStore;
use crate::sync::{ConnectivityMonitor, DrainOutcome, OfflineQueue, QueueOp};

/// Result of a checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
  /// Accepted by the backend.
  Completed,
  /// Stored for replay; the sale is finalized locally.
  Queued,
  /// No cart to check out.
  Empty,
  /// Could not be persisted anywhere; the cart is left untouched.
  Failed,
}

pub struct PosSession<K: KvStore> {
  store: CartStore<K>,
  queue: Arc<OfflineQueue<K>>,
  monitor: Arc<ConnectivityMonitor>,
  client: PosClient,
  reads: CachedPosClient,
}

impl<K: KvStore + 'static> PosSession<K> {
  pub fn new(
    store: CartStore<K>,
    queue: Arc<OfflineQueue<K>>,
    monitor: Arc<ConnectivityMonitor>,
    client: PosClient,
    reads: CachedPosClient,
  ) -> Self {
    Self {
      store,
      queue,
      monitor,
      client,
      reads,
    }
  }

  /// Spawn the reconnect-edge task: one drain attempt per offline→online
  /// transition.
  pub fn start_sync(&self) {
    let queue = Arc::clone(&self.queue);
    let client = self.client.clone();

    self.monitor.spawn_reconnect_task(move || {
      let queue = Arc::clone(&queue);
      let client = client.clone();
      async move {
        let outcome = queue
          .drain(|op| {
            let client = client.clone();
            async move { client.push(&op).await }
          })
          .await;
        info!(
          processed = outcome.processed,
          remaining = outcome.remaining,
          "Reconnect drain finished"
        );
      }
    });
  }

  // ===== Cart mutations =====

  /// Add a product to the cart and sync the mutation.
  pub async fn add_item(&self, product: &Product, quantity: u32, notes: Option<&str>) -> bool {
    let snapshot = product.snapshot();
    if !self.store.add_item(&snapshot, quantity, notes) {
      return false;
    }

    let item = CartItem {
      id: product.id.clone(),
      product: snapshot,
      quantity,
      added_at: chrono::Utc::now(),
      notes: notes.map(String::from),
    };
    self.dispatch(QueueOp::CartAdd { item }).await;
    true
  }

  pub async fn remove_item(&self, product_id: &str) -> bool {
    if !self.store.remove_item(product_id) {
      return false;
    }
    self
      .dispatch(QueueOp::CartRemove {
        product_id: product_id.to_string(),
      })
      .await;
    true
  }

  pub async fn set_quantity(&self, product_id: &str, quantity: u32) -> bool {
    if !self.store.set_quantity(product_id, quantity) {
      return false;
    }
    let op = if quantity == 0 {
      QueueOp::CartRemove {
        product_id: product_id.to_string(),
      }
    } else {
      QueueOp::CartUpdate {
        product_id: product_id.to_string(),
        quantity,
      }
    };
    self.dispatch(op).await;
    true
  }

  /// Finalize the current cart. Online checkouts go straight to the
  /// backend; offline (or failed) ones are queued for replay and the sale
  /// is closed out locally either way.
  pub async fn checkout(&self) -> CheckoutOutcome {
    let cart = match self.store.load() {
      Some(cart) if !cart.items.is_empty() => cart,
      _ => return CheckoutOutcome::Empty,
    };

    let op = QueueOp::Checkout { cart };

    if self.monitor.is_online() {
      match self.client.push(&op).await {
        Ok(()) => {
          self.store.clear();
          return CheckoutOutcome::Completed;
        }
        Err(e) => {
          warn!(error = %e, "Checkout push failed; queueing for replay");
        }
      }
    }

    match self.queue.enqueue(op) {
      Some(_) => {
        self.store.clear();
        CheckoutOutcome::Queued
      }
      None => CheckoutOutcome::Failed,
    }
  }

  /// Manually drain the offline queue.
  pub async fn drain_now(&self) -> DrainOutcome {
    let client = self.client.clone();
    self
      .queue
      .drain(|op| {
        let client = client.clone();
        async move { client.push(&op).await }
      })
      .await
  }

  // ===== Reads =====

  pub async fn products(&self) -> color_eyre::Result<Listing<Product>> {
    self.reads.products().await
  }

  pub async fn employees(&self) -> color_eyre::Result<Listing<Employee>> {
    self.reads.employees().await
  }

  // ===== Accessors =====

  pub fn cart(&self) -> Option<CartState> {
    self.store.load()
  }

  pub fn store(&self) -> &CartStore<K> {
    &self.store
  }

  pub fn queue(&self) -> &OfflineQueue<K> {
    &self.queue
  }

  pub fn monitor(&self) -> &ConnectivityMonitor {
    &self.monitor
  }

  // ===== Internals =====

  /// Online: push now, queue on failure. Offline: queue directly.
  async fn dispatch(&self, op: QueueOp) {
    if self.monitor.is_online() {
      if let Err(e) = self.client.push(&op).await {
        warn!(op = op.kind(), error = %e, "Immediate push failed; queueing for replay");
        self.queue.enqueue(op);
      }
    } else {
      self.queue.enqueue(op);
    }
  }
}
