//! Cache layer that orchestrates caching logic with network fetching.
//!
//! Sits in front of all read (GET) traffic for the intercepted path
//! classes, serving cache-first with revalidation. The lifecycle of one
//! path is miss → fetching → fresh → stale → fresh again after a
//! revalidation, with an offline-fallback branch reachable from any state
//! when the network fails. The layer never retries on its own; staleness
//! is resolved by the next natural request cycle.

use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheClass, CacheStats, CachedResponse};
use crate::api::ApiError;

/// Cache layer over a storage backend and a network fetcher.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// Overrides the per-class network deadline when set. Used by tests.
  timeout_override: Option<StdDuration>,
}

impl<S: CacheStorage + 'static> CacheLayer<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      timeout_override: None,
    }
  }

  /// Replace the per-class network deadlines with a fixed one.
  #[allow(dead_code)]
  pub fn with_timeout(mut self, deadline: StdDuration) -> Self {
    self.timeout_override = Some(deadline);
    self
  }

  fn deadline(&self, class: CacheClass) -> StdDuration {
    self.timeout_override.unwrap_or_else(|| class.timeout())
  }

  /// Serve a GET for `path`, cache-first with revalidation.
  ///
  /// 1. A fresh entry is served immediately and a non-blocking background
  ///    re-fetch refreshes it for future requests.
  /// 2. A miss or stale entry triggers a network fetch under the class
  ///    deadline; a successful body is stored and returned.
  /// 3. Any network failure falls back to the most recent entry for the
  ///    path regardless of its age, marked offline; with no entry at all,
  ///    a structured offline payload is returned. The caller never sees
  ///    an unhandled failure.
  pub async fn get<F, Fut>(&self, path: &str, fetcher: F) -> CachedResponse
  where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let class = CacheClass::for_path(path);

    let cached = match self.storage.get(path) {
      Ok(cached) => cached,
      Err(e) => {
        debug!(path, error = %e, "Cache read failed; treating as miss");
        None
      }
    };

    if let Some(entry) = &cached {
      // Freshness is judged against the class recorded at store time.
      if Utc::now() - entry.cached_at < entry.class.ttl() {
        debug!(path, class = entry.class.as_str(), "Cache fresh; revalidating in background");
        self.spawn_revalidation(path, class, fetcher);
        return CachedResponse::from_cache(entry.body.clone(), entry.cached_at);
      }
    }

    match timeout(self.deadline(class), fetcher(path.to_string())).await {
      Ok(Ok(body)) => {
        if let Err(e) = self.storage.put(path, class, &body) {
          warn!(path, error = %e, "Failed to store fetched response");
        }
        CachedResponse::from_network(body)
      }
      Ok(Err(e)) => self.fallback(path, cached, &e.to_string()),
      Err(_) => self.fallback(path, cached, "request timed out"),
    }
  }

  /// Report entry counts per bucket.
  pub fn stats(&self) -> CacheStats {
    self.storage.stats().unwrap_or_else(|e| {
      debug!(error = %e, "Cache stats unavailable");
      CacheStats::default()
    })
  }

  /// Wipe every cached entry. Returns whether the wipe succeeded.
  pub fn clear(&self) -> bool {
    match self.storage.clear() {
      Ok(()) => true,
      Err(e) => {
        warn!(error = %e, "Failed to clear cache");
        false
      }
    }
  }

  fn fallback(
    &self,
    path: &str,
    cached: Option<super::storage::CachedEntry>,
    reason: &str,
  ) -> CachedResponse {
    match cached {
      Some(entry) => {
        debug!(path, reason, "Network unavailable; serving cached entry");
        CachedResponse::offline_fallback(entry.body, entry.cached_at)
      }
      None => {
        debug!(path, reason, "Network unavailable and nothing cached");
        CachedResponse::offline_error(reason)
      }
    }
  }

  fn spawn_revalidation<F, Fut>(&self, path: &str, class: CacheClass, fetcher: F)
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let storage = Arc::clone(&self.storage);
    let path = path.to_string();
    let deadline = self.deadline(class);

    tokio::spawn(async move {
      match timeout(deadline, fetcher(path.clone())).await {
        Ok(Ok(body)) => {
          if let Err(e) = storage.put(&path, class, &body) {
            warn!(%path, error = %e, "Failed to store revalidated response");
          }
        }
        Ok(Err(e)) => {
          // The caller already has a usable response; nothing to do.
          debug!(%path, error = %e, "Background revalidation failed");
        }
        Err(_) => {
          debug!(%path, "Background revalidation timed out");
        }
      }
    });
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      timeout_override: self.timeout_override,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use crate::cache::traits::CacheSource;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn counting_fetcher(
    calls: Arc<AtomicUsize>,
    result: Value,
  ) -> impl Fn(String) -> futures::future::BoxFuture<'static, Result<Value, ApiError>>
       + Clone
       + Send
       + Sync
       + 'static {
    move |_path| {
      calls.fetch_add(1, Ordering::SeqCst);
      let result = result.clone();
      Box::pin(async move { Ok(result) })
    }
  }

  fn failing_fetcher(
    calls: Arc<AtomicUsize>,
  ) -> impl Fn(String) -> futures::future::BoxFuture<'static, Result<Value, ApiError>>
       + Clone
       + Send
       + Sync
       + 'static {
    move |_path| {
      calls.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move { Err(ApiError::Timeout) })
    }
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores() {
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap());
    let calls = Arc::new(AtomicUsize::new(0));

    let response = layer
      .get(
        "/api/products",
        counting_fetcher(Arc::clone(&calls), json!({"data": [1]})),
      )
      .await;

    assert_eq!(response.source, CacheSource::Network);
    assert_eq!(response.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fresh_hit_serves_without_blocking_on_network() {
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap());
    let calls = Arc::new(AtomicUsize::new(0));

    // Prime the cache.
    layer
      .get(
        "/api/products",
        counting_fetcher(Arc::clone(&calls), json!({"v": 1})),
      )
      .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Fresh hit: the response resolves from cache; the only network
    // activity is the non-blocking background revalidation.
    let slow_calls = Arc::new(AtomicUsize::new(0));
    let slow_calls2 = Arc::clone(&slow_calls);
    let response = layer
      .get("/api/products", move |_path| {
        let calls = Arc::clone(&slow_calls2);
        let fut: futures::future::BoxFuture<'static, Result<Value, ApiError>> =
          Box::pin(async move {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"v": 2}))
          });
        fut
      })
      .await;

    assert_eq!(response.source, CacheSource::CacheFresh);
    assert_eq!(response.body["v"], 1);
    // At the moment the caller got its answer, no network call completed.
    assert_eq!(slow_calls.load(Ordering::SeqCst), 0);

    // The background revalidation eventually refreshes the entry.
    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
    let refreshed = layer.storage.get("/api/products").unwrap().unwrap();
    assert_eq!(refreshed.body["v"], 2);
  }

  #[tokio::test]
  async fn test_stale_entry_triggers_exactly_one_fetch() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("/api/products", CacheClass::Products, &json!({"v": 1}))
      .unwrap();
    storage
      .backdate("/api/products", Utc::now() - chrono::Duration::minutes(31))
      .unwrap();

    let layer = CacheLayer::new(storage);
    let calls = Arc::new(AtomicUsize::new(0));

    let response = layer
      .get(
        "/api/products",
        counting_fetcher(Arc::clone(&calls), json!({"v": 2})),
      )
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.source, CacheSource::Network);
    assert_eq!(response.body["v"], 2);
  }

  #[tokio::test]
  async fn test_stale_entry_survives_network_failure_with_offline_marker() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("/api/products", CacheClass::Products, &json!({"v": 1}))
      .unwrap();
    storage
      .backdate("/api/products", Utc::now() - chrono::Duration::minutes(31))
      .unwrap();

    let layer = CacheLayer::new(storage);
    let calls = Arc::new(AtomicUsize::new(0));

    let response = layer
      .get("/api/products", failing_fetcher(Arc::clone(&calls)))
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.source, CacheSource::OfflineFallback);
    assert!(response.source.is_offline());
    assert_eq!(response.body["v"], 1);
    assert!(response.cached_at.is_some());
  }

  #[tokio::test]
  async fn test_miss_with_network_failure_returns_offline_envelope() {
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap());
    let calls = Arc::new(AtomicUsize::new(0));

    let response = layer
      .get("/api/products", failing_fetcher(Arc::clone(&calls)))
      .await;

    assert_eq!(response.status, 503);
    assert_eq!(response.source, CacheSource::OfflineError);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["offline"], true);
    assert!(response.body["data"].as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_noop_storage_always_fetches() {
    let layer = CacheLayer::new(crate::cache::NoopStorage);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
      let response = layer
        .get(
          "/api/products",
          counting_fetcher(Arc::clone(&calls), json!({"v": 1})),
        )
        .await;
      assert_eq!(response.source, CacheSource::Network);
    }

    // Nothing is retained, so every request goes to the network.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_slow_fetch_hits_deadline_and_falls_back() {
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap())
      .with_timeout(StdDuration::from_millis(50));

    let response = layer
      .get("/api/products", |_path| {
        let fut: futures::future::BoxFuture<'static, Result<Value, ApiError>> =
          Box::pin(async move {
            tokio::time::sleep(StdDuration::from_secs(5)).await;
            Ok(json!({}))
          });
        fut
      })
      .await;

    assert_eq!(response.status, 503);
    assert_eq!(response.source, CacheSource::OfflineError);
  }
}
