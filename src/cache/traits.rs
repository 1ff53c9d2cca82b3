//! Core types for the read-path caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration as StdDuration;

/// Freshness class of a cached path, selected by substring match against
/// the request path. Paths on the intercepted whitelist that match no
/// known class land in `Main` and reuse the products TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheClass {
  Products,
  Employees,
  Static,
  Main,
}

impl CacheClass {
  /// Classify a canonical request path.
  pub fn for_path(path: &str) -> Self {
    if path.contains("/products") {
      CacheClass::Products
    } else if path.contains("/employees") {
      CacheClass::Employees
    } else if path.contains("/static/") || path.contains("/assets/") {
      CacheClass::Static
    } else {
      CacheClass::Main
    }
  }

  /// Maximum age before an entry is considered stale.
  pub fn ttl(self) -> Duration {
    match self {
      CacheClass::Products | CacheClass::Main => Duration::minutes(30),
      CacheClass::Employees => Duration::minutes(60),
      CacheClass::Static => Duration::hours(24),
    }
  }

  /// Network deadline for a fetch of this class.
  pub fn timeout(self) -> StdDuration {
    match self {
      CacheClass::Products | CacheClass::Main => StdDuration::from_secs(10),
      CacheClass::Employees => StdDuration::from_secs(15),
      CacheClass::Static => StdDuration::from_secs(5),
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      CacheClass::Products => "products",
      CacheClass::Employees => "employees",
      CacheClass::Static => "static",
      CacheClass::Main => "main",
    }
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data fetched from the network on this request.
  Network,
  /// Served from cache within its TTL; a background revalidation was fired.
  CacheFresh,
  /// Network failed; the most recent entry was served regardless of age.
  OfflineFallback,
  /// Network failed and no entry existed; a structured offline payload
  /// was synthesized.
  OfflineError,
}

impl CacheSource {
  /// Whether the response should carry the offline indicator.
  pub fn is_offline(self) -> bool {
    matches!(self, CacheSource::OfflineFallback | CacheSource::OfflineError)
  }
}

/// A response produced by the cache layer. Always resolves; network
/// failures surface as `OfflineFallback`/`OfflineError`, never as errors.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub status: u16,
  pub body: Value,
  pub source: CacheSource,
  /// When the served entry was cached, for cache-sourced responses.
  pub cached_at: Option<DateTime<Utc>>,
}

impl CachedResponse {
  pub fn from_network(body: Value) -> Self {
    Self {
      status: 200,
      body,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(body: Value, cached_at: DateTime<Utc>) -> Self {
    Self {
      status: 200,
      body,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  pub fn offline_fallback(body: Value, cached_at: DateTime<Utc>) -> Self {
    Self {
      status: 200,
      body,
      source: CacheSource::OfflineFallback,
      cached_at: Some(cached_at),
    }
  }

  /// The structured payload returned when nothing can be served at all.
  pub fn offline_error(error: &str) -> Self {
    Self {
      status: 503,
      body: offline_envelope(error),
      source: CacheSource::OfflineError,
      cached_at: None,
    }
  }
}

/// Offline-error response envelope.
pub fn offline_envelope(error: &str) -> Value {
  json!({
    "success": false,
    "error": error,
    "offline": true,
    "data": [],
  })
}

/// Entry counts reported to the UI through the control protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
  /// Products and employee roster entries.
  pub api: usize,
  #[serde(rename = "static")]
  pub static_entries: usize,
  pub main: usize,
  pub total: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_class_selection_by_path() {
    assert_eq!(CacheClass::for_path("/api/products"), CacheClass::Products);
    assert_eq!(
      CacheClass::for_path("/api/products/42"),
      CacheClass::Products
    );
    assert_eq!(CacheClass::for_path("/api/employees"), CacheClass::Employees);
    assert_eq!(CacheClass::for_path("/static/logo.png"), CacheClass::Static);
    assert_eq!(CacheClass::for_path("/api/settings"), CacheClass::Main);
  }

  #[test]
  fn test_default_bucket_uses_products_ttl() {
    assert_eq!(CacheClass::Main.ttl(), CacheClass::Products.ttl());
  }

  #[test]
  fn test_offline_envelope_shape() {
    let response = CachedResponse::offline_error("no connection");
    assert_eq!(response.status, 503);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["offline"], true);
    assert!(response.body["data"].as_array().unwrap().is_empty());
    assert!(response.source.is_offline());
  }
}
