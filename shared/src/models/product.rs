//! Product catalog view used by inventory accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default reorder quantity when a product has none configured
pub const DEFAULT_SUGGESTED_QUANTITY: i64 = 50;

/// Default supplier lead time when a product has none configured
pub const DEFAULT_LEAD_TIME_DAYS: i32 = 7;

/// The slice of a catalog product that inventory needs.
///
/// `stock` is a denormalized cache of the sum of every inventory record of
/// the product. It is never used for stock decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub stock: i64,
    pub reorder_threshold: i64,
    pub reorder_quantity: Option<i64>,
    pub lead_time_days: Option<i32>,
    pub track_inventory: bool,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, reorder_threshold: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sku: None,
            supplier_id: None,
            stock: 0,
            reorder_threshold,
            reorder_quantity: None,
            lead_time_days: None,
            track_inventory: true,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Whether the reorder sweep should look at this product
    pub fn is_reorder_candidate(&self) -> bool {
        self.is_active && self.track_inventory
    }

    pub fn suggested_quantity(&self, fallback: i64) -> i64 {
        self.reorder_quantity.filter(|q| *q > 0).unwrap_or(fallback)
    }

    pub fn lead_time(&self, fallback: i32) -> i32 {
        self.lead_time_days.filter(|d| *d >= 0).unwrap_or(fallback)
    }
}
