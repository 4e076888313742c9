//! Aggregated read views over inventory records

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InventoryRecord, InventoryStatus};

/// Stock of one product across every location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductInventory {
    pub product_id: Uuid,
    pub total_quantity: i64,
    /// Quantity in `active` records only
    pub available_quantity: i64,
    pub by_location: Vec<LocationStock>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationStock {
    pub location_id: Uuid,
    pub quantity: i64,
    pub available_quantity: i64,
    pub batches: Vec<BatchStock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchStock {
    pub record_id: Uuid,
    pub batch_number: Option<String>,
    pub quantity: i64,
    pub status: InventoryStatus,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Stock held at one location, broken down by product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationInventory {
    pub location_id: Uuid,
    pub total_quantity: i64,
    pub total_value: Decimal,
    pub by_product: Vec<ProductStock>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductStock {
    pub product_id: Uuid,
    pub quantity: i64,
    pub value: Decimal,
    pub record_count: usize,
}

/// Where a serial number currently sits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SerialLocation {
    pub serial_number: String,
    pub record_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub batch_number: Option<String>,
    pub status: InventoryStatus,
}

impl SerialLocation {
    pub fn from_record(serial_number: &str, record: &InventoryRecord) -> Self {
        Self {
            serial_number: serial_number.to_string(),
            record_id: record.id,
            product_id: record.product_id,
            location_id: record.location_id,
            batch_number: record.batch_number.clone(),
            status: record.status,
        }
    }
}

fn available(record: &InventoryRecord) -> i64 {
    if record.status == InventoryStatus::Active {
        record.quantity
    } else {
        0
    }
}

impl ProductInventory {
    /// Build from every record of `product_id`
    pub fn from_records(product_id: Uuid, records: &[InventoryRecord]) -> Self {
        let mut by_location: BTreeMap<Uuid, LocationStock> = BTreeMap::new();
        for record in records.iter().filter(|r| r.product_id == product_id) {
            let stock = by_location
                .entry(record.location_id)
                .or_insert_with(|| LocationStock {
                    location_id: record.location_id,
                    quantity: 0,
                    available_quantity: 0,
                    batches: Vec::new(),
                });
            stock.quantity += record.quantity;
            stock.available_quantity += available(record);
            stock.batches.push(BatchStock {
                record_id: record.id,
                batch_number: record.batch_number.clone(),
                quantity: record.quantity,
                status: record.status,
                expiration_date: record.expiration_date,
            });
        }

        let by_location: Vec<LocationStock> = by_location.into_values().collect();
        Self {
            product_id,
            total_quantity: by_location.iter().map(|l| l.quantity).sum(),
            available_quantity: by_location.iter().map(|l| l.available_quantity).sum(),
            last_updated: records
                .iter()
                .filter(|r| r.product_id == product_id)
                .map(|r| r.last_updated)
                .max(),
            by_location,
        }
    }
}

impl LocationInventory {
    /// Build from every record held at `location_id`
    pub fn from_records(location_id: Uuid, records: &[InventoryRecord]) -> Self {
        let mut by_product: BTreeMap<Uuid, ProductStock> = BTreeMap::new();
        for record in records.iter().filter(|r| r.location_id == location_id) {
            let stock = by_product
                .entry(record.product_id)
                .or_insert_with(|| ProductStock {
                    product_id: record.product_id,
                    quantity: 0,
                    value: Decimal::ZERO,
                    record_count: 0,
                });
            stock.quantity += record.quantity;
            stock.value += record.value();
            stock.record_count += 1;
        }

        let by_product: Vec<ProductStock> = by_product.into_values().collect();
        Self {
            location_id,
            total_quantity: by_product.iter().map(|p| p.quantity).sum(),
            total_value: by_product.iter().map(|p| p.value).sum(),
            last_updated: records
                .iter()
                .filter(|r| r.location_id == location_id)
                .map(|r| r.last_updated)
                .max(),
            by_product,
        }
    }
}
