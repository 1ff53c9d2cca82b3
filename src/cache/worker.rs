//! Cache worker: the request-interception context.
//!
//! The cache layer runs in its own task and is reached only through
//! message passing; request/response pairs are a command plus a oneshot
//! reply channel, so the UI side never shares mutable state with it.

use serde_json::Value;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::layer::CacheLayer;
use super::storage::CacheStorage;
use super::traits::{CacheStats, CachedResponse};
use crate::api::ApiError;

/// Endpoints warmed by a prefetch request.
const PREFETCH_ENDPOINTS: &[&str] = &["/api/products", "/api/employees"];

/// Control protocol between the UI context and the cache worker.
#[derive(Debug)]
pub enum CacheCommand {
  /// Intercepted GET for a canonical path.
  Get {
    path: String,
    reply: oneshot::Sender<CachedResponse>,
  },
  /// Entry counts per bucket.
  Status { reply: oneshot::Sender<CacheStats> },
  /// Wipe all cached entries.
  Clear { reply: oneshot::Sender<bool> },
  /// Fire-and-forget warm-up of the critical endpoints.
  Prefetch,
  /// Stop the worker. No reply payload.
  Shutdown,
}

/// Client half of the worker channel. Cheap to clone.
#[derive(Clone)]
pub struct CacheHandle {
  tx: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
  /// Serve a GET through the cache worker. A dead worker degrades to the
  /// offline envelope rather than an error.
  pub async fn get(&self, path: &str) -> CachedResponse {
    let (reply, rx) = oneshot::channel();
    let command = CacheCommand::Get {
      path: path.to_string(),
      reply,
    };
    if self.tx.send(command).await.is_err() {
      return CachedResponse::offline_error("cache worker unavailable");
    }
    rx.await
      .unwrap_or_else(|_| CachedResponse::offline_error("cache worker unavailable"))
  }

  pub async fn status(&self) -> CacheStats {
    let (reply, rx) = oneshot::channel();
    if self
      .tx
      .send(CacheCommand::Status { reply })
      .await
      .is_err()
    {
      return CacheStats::default();
    }
    rx.await.unwrap_or_default()
  }

  pub async fn clear(&self) -> bool {
    let (reply, rx) = oneshot::channel();
    if self.tx.send(CacheCommand::Clear { reply }).await.is_err() {
      return false;
    }
    rx.await.unwrap_or(false)
  }

  /// Fire-and-forget; dropped silently if the worker queue is full.
  pub fn prefetch(&self) {
    let _ = self.tx.try_send(CacheCommand::Prefetch);
  }

  pub fn shutdown(&self) {
    let _ = self.tx.try_send(CacheCommand::Shutdown);
  }
}

/// Spawn the worker task over a cache layer and a network fetcher.
/// Requests are handled concurrently; control messages are handled in
/// arrival order.
pub fn spawn<S, F, Fut>(layer: CacheLayer<S>, fetcher: F) -> CacheHandle
where
  S: CacheStorage + 'static,
  F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
  Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
{
  let (tx, mut rx) = mpsc::channel::<CacheCommand>(64);

  tokio::spawn(async move {
    while let Some(command) = rx.recv().await {
      match command {
        CacheCommand::Get { path, reply } => {
          let layer = layer.clone();
          let fetcher = fetcher.clone();
          tokio::spawn(async move {
            let response = layer.get(&path, fetcher).await;
            let _ = reply.send(response);
          });
        }
        CacheCommand::Status { reply } => {
          let _ = reply.send(layer.stats());
        }
        CacheCommand::Clear { reply } => {
          info!("Clearing response cache");
          let _ = reply.send(layer.clear());
        }
        CacheCommand::Prefetch => {
          debug!("Prefetching critical endpoints");
          for path in PREFETCH_ENDPOINTS {
            let layer = layer.clone();
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
              let _ = layer.get(path, fetcher).await;
            });
          }
        }
        CacheCommand::Shutdown => {
          debug!("Cache worker shutting down");
          break;
        }
      }
    }
  });

  CacheHandle { tx }
}
