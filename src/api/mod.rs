//! Backend API surface: the HTTP client, response decoding, and the
//! cached read client used for reference data.

mod cached_client;
mod client;
pub mod decode;
mod error;
pub mod types;

pub use cached_client::{CachedPosClient, Listing};
pub use client::PosClient;
pub use error::ApiError;
