//! Remote call error classification.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Unauthorized - credentials rejected")]
  Unauthorized,

  #[error("Access denied: {0}")]
  AccessDenied(String),

  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("Rate limited - please wait before retrying")]
  RateLimited,

  #[error("Server error: {0}")]
  ServerError(String),

  #[error("Request timed out")]
  Timeout,

  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Invalid response: {0}")]
  InvalidResponse(String),
}

/// Maximum length for error response bodies carried in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      body.to_string()
    } else {
      format!(
        "{}... (truncated, {} total bytes)",
        &body[..MAX_ERROR_BODY_LENGTH],
        body.len()
      )
    }
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    match status.as_u16() {
      401 => ApiError::Unauthorized,
      403 => ApiError::AccessDenied(truncated),
      404 => ApiError::NotFound(truncated),
      429 => ApiError::RateLimited,
      500..=599 => ApiError::ServerError(truncated),
      _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_classification() {
    assert!(matches!(
      ApiError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
      ApiError::Unauthorized
    ));
    assert!(matches!(
      ApiError::from_status(reqwest::StatusCode::NOT_FOUND, "missing"),
      ApiError::NotFound(_)
    ));
    assert!(matches!(
      ApiError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom"),
      ApiError::ServerError(_)
    ));
    assert!(matches!(
      ApiError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
      ApiError::RateLimited
    ));
  }

  #[test]
  fn test_long_bodies_are_truncated() {
    let body = "x".repeat(2000);
    match ApiError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body) {
      ApiError::ServerError(msg) => assert!(msg.len() < 600),
      other => panic!("unexpected variant: {other:?}"),
    }
  }
}
