//! Durable local state: the cart session, its metadata, and the bounded
//! recovery history, persisted through a key-value medium.

mod cart;
pub mod kv;
pub mod types;

pub use cart::CartStore;
pub use kv::{KvStore, MemoryKv, SqliteKv};
