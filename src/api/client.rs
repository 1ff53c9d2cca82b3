//! HTTP client for the POS backend.

use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::error::ApiError;
use crate::sync::QueueOp;

/// Upper bound on any single mutation push. Read traffic is bounded
/// separately by the cache layer's per-class deadlines.
const PUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend API client.
#[derive(Clone)]
pub struct PosClient {
  http: reqwest::Client,
  base: Url,
}

impl PosClient {
  pub fn new(base_url: &str) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid API base url {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(PUSH_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base
      .join(path)
      .map_err(|e| ApiError::InvalidResponse(format!("Bad request path {}: {}", path, e)))
  }

  /// GET a path and return its JSON body. Non-2xx statuses are classified
  /// into `ApiError`; the cache layer decides what to do with failures.
  pub async fn get_raw(&self, path: &str) -> Result<Value, ApiError> {
    let url = self.endpoint(path)?;
    let response = self.http.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ApiError::from_status(status, &body));
    }

    let body = response
      .json::<Value>()
      .await
      .map_err(|e| ApiError::InvalidResponse(format!("Body is not JSON: {}", e)))?;
    Ok(body)
  }

  /// Replay one queued mutation against its backend endpoint.
  pub async fn push(&self, op: &QueueOp) -> Result<(), ApiError> {
    let (path, body) = mutation_request(op);
    let url = self.endpoint(path)?;

    let response = self.http.post(url).json(&body).send().await?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(ApiError::from_status(status, &text));
    }

    Ok(())
  }
}

/// Endpoint and body for each mutation type.
fn mutation_request(op: &QueueOp) -> (&'static str, Value) {
  match op {
    QueueOp::CartAdd { item } => ("/api/cart/add", json!({ "item": item })),
    QueueOp::CartUpdate {
      product_id,
      quantity,
    } => (
      "/api/cart/update",
      json!({ "productId": product_id, "quantity": quantity }),
    ),
    QueueOp::CartRemove { product_id } => {
      ("/api/cart/remove", json!({ "productId": product_id }))
    }
    QueueOp::Checkout { cart } => ("/api/checkout", json!({ "cart": cart })),
  }
}
