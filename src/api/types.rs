//! Reference-data entities served by the backend.

use serde::{Deserialize, Serialize};

use crate::store::types::ProductSnapshot;

/// Catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: String,
  pub name: String,
  pub price: f64,
  #[serde(default)]
  pub sku: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub barcode: Option<String>,
}

impl Product {
  /// Denormalized copy embedded into cart lines.
  pub fn snapshot(&self) -> ProductSnapshot {
    ProductSnapshot {
      id: self.id.clone(),
      name: self.name.clone(),
      price: self.price,
      sku: self.sku.clone(),
      category: self.category.clone(),
    }
  }
}

/// Roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub role: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_snapshot_copies_pricing_fields() {
    let product = Product {
      id: "p1".into(),
      name: "Widget".into(),
      price: 4.25,
      sku: Some("W-1".into()),
      category: None,
      barcode: Some("123".into()),
    };

    let snapshot = product.snapshot();
    assert_eq!(snapshot.id, "p1");
    assert_eq!(snapshot.sku.as_deref(), Some("W-1"));
    assert!((snapshot.price - 4.25).abs() < f64::EPSILON);
  }
}
