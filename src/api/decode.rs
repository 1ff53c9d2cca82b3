//! Decoding of heterogeneous list payloads.
//!
//! The backend is inconsistent about response envelopes: some endpoints
//! return `{ data: [...] }`, some wrap the list one level deeper under the
//! entity name, and some return a bare array. Rather than sniffing shapes
//! ad hoc at every call site, the accepted shapes form one ordered
//! priority list; the first extractor that matches wins.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("Payload matches no known response shape")]
  UnrecognizedShape,

  #[error("Payload matched a shape but items failed to decode: {0}")]
  Deserialize(#[from] serde_json::Error),
}

/// Extractors in priority order. `entity` is the plural field name used
/// by the nested envelope (e.g. "products").
fn candidate_lists<'v>(entity: &str, body: &'v Value) -> Vec<&'v Value> {
  let mut candidates = Vec::new();

  // 1. { data: [...] }
  if let Some(list) = body.get("data").filter(|v| v.is_array()) {
    candidates.push(list);
  }
  // 2. { success, data: { <entity>: [...] } }
  if let Some(list) = body
    .get("data")
    .and_then(|d| d.get(entity))
    .filter(|v| v.is_array())
  {
    candidates.push(list);
  }
  // 3. bare array
  if body.is_array() {
    candidates.push(body);
  }

  candidates
}

/// Decode a list of `T` out of whichever envelope the backend used.
pub fn decode_items<T: DeserializeOwned>(entity: &str, body: &Value) -> Result<Vec<T>, DecodeError> {
  let candidates = candidate_lists(entity, body);
  let list = candidates.first().ok_or(DecodeError::UnrecognizedShape)?;
  let items = serde_json::from_value(Value::Array(
    list.as_array().cloned().unwrap_or_default(),
  ))?;
  Ok(items)
}
