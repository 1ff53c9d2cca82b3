//! Connectivity monitor.
//!
//! Wraps the platform's online/offline signal in a watch channel and
//! exposes edge transitions only: the offline→online edge fires exactly
//! one reconnect callback (used to drain the offline queue), the
//! online→offline edge just flips the flag. The platform signal is
//! trusted as-is; there is no heartbeat and no flap debouncing.

use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ConnectivityMonitor {
  tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
  pub fn new(initially_online: bool) -> Self {
    let (tx, _rx) = watch::channel(initially_online);
    Self { tx }
  }

  /// Entry point for the platform glue reporting the current link state.
  pub fn set_online(&self, online: bool) {
    // send_if_modified keeps repeated reports of the same state from
    // waking subscribers, so only true transitions are observed.
    self.tx.send_if_modified(|state| {
      if *state == online {
        false
      } else {
        *state = online;
        true
      }
    });
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Spawn the edge-detection task. `on_reconnect` runs once per
  /// offline→online transition; nothing runs on the opposite edge.
  pub fn spawn_reconnect_task<F, Fut>(&self, on_reconnect: F) -> JoinHandle<()>
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
  {
    let mut rx = self.tx.subscribe();
    let mut last = *rx.borrow();

    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        if online && !last {
          debug!("Connectivity restored; triggering queue drain");
          on_reconnect().await;
        }
        last = online;
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
  }

  #[tokio::test]
  async fn test_reconnect_fires_once_per_edge() {
    let monitor = ConnectivityMonitor::new(true);
    let fired = Arc::new(AtomicUsize::new(0));

    let fired2 = Arc::clone(&fired);
    monitor.spawn_reconnect_task(move || {
      let fired = Arc::clone(&fired2);
      async move {
        fired.fetch_add(1, Ordering::SeqCst);
      }
    });

    monitor.set_online(false);
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    monitor.set_online(true);
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Repeated online reports are not edges.
    monitor.set_online(true);
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    monitor.set_online(false);
    monitor.set_online(true);
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_going_offline_only_flips_flag() {
    let monitor = ConnectivityMonitor::new(true);
    let fired = Arc::new(AtomicUsize::new(0));

    let fired2 = Arc::clone(&fired);
    monitor.spawn_reconnect_task(move || {
      let fired = Arc::clone(&fired2);
      async move {
        fired.fetch_add(1, Ordering::SeqCst);
      }
    });

    monitor.set_online(false);
    settle().await;
    assert!(!monitor.is_online());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }
}
