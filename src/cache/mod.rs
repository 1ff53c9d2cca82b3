//! Read-path caching with offline support.
//!
//! This module intercepts GET traffic for reference data and serves it
//! cache-first with background revalidation:
//! - Each path class carries its own TTL and network deadline
//! - Stale entries are refetched; failures fall back to the cache
//! - With nothing cached, callers get a structured offline payload
//! - The layer runs in a worker task reached via message passing

mod layer;
mod storage;
mod traits;
pub mod worker;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, CachedEntry, NoopStorage, SqliteStorage};
pub use traits::{offline_envelope, CacheClass, CacheSource, CacheStats, CachedResponse};
pub use worker::CacheHandle;
