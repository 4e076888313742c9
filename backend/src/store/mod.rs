//! Persistence seam for inventory accounting
//!
//! Reads are plain queries. Every stock-changing write goes through
//! [`InventoryStore::apply_changes`], which is all-or-nothing: the record
//! updates, their transaction log entries, reversal marks and the
//! denormalized `Product.stock` / `Location.current_usage` totals commit
//! together or not at all.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgInventoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    AlertFilter, AlertStatus, InventoryRecord, InventoryStatus, Location, Product, QuantityChange,
    ReorderAlert, StockAdjustment, TransactionFilter, TransactionLogEntry, TransactionStatus,
    TransactionType,
};
use uuid::Uuid;

use crate::error::AppResult;

/// Which record a change applies to
#[derive(Debug, Clone)]
pub enum RecordTarget {
    /// A record that must already exist
    Existing(Uuid),
    /// The record with the template's (product, location, batch) scope,
    /// inserted from the template when absent
    FindOrCreate(InventoryRecord),
    /// Insert the template; fails with `DuplicateBatch` if the scope is taken
    CreateNew(InventoryRecord),
}

/// Transaction log fields known before the target record is resolved
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub transaction_type: TransactionType,
    pub from_location: Option<Uuid>,
    pub to_location: Option<Uuid>,
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
    pub serial_numbers: Vec<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub actor: Uuid,
    pub supplier_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl TransactionDraft {
    pub fn new(transaction_type: TransactionType, quantity: i64, actor: Uuid) -> Self {
        Self {
            transaction_type,
            from_location: None,
            to_location: None,
            quantity,
            unit_price: None,
            serial_numbers: Vec::new(),
            reference_id: None,
            reference_type: None,
            actor,
            supplier_id: None,
            customer_id: None,
            notes: None,
        }
    }

    /// Complete the entry against the record it moved and the change it made
    pub fn into_entry(
        self,
        record: &InventoryRecord,
        change: &QuantityChange,
        now: DateTime<Utc>,
    ) -> TransactionLogEntry {
        let total_value = self.unit_price.map(|p| p * Decimal::from(self.quantity));
        TransactionLogEntry {
            id: Uuid::new_v4(),
            transaction_type: self.transaction_type,
            product_id: record.product_id,
            location_id: record.location_id,
            record_id: record.id,
            from_location: self.from_location,
            to_location: self.to_location,
            quantity: self.quantity,
            applied_delta: change.applied_delta(),
            unit_price: self.unit_price,
            total_value,
            batch_number: record.batch_number.clone(),
            serial_numbers: self.serial_numbers,
            reference_id: self.reference_id,
            reference_type: self.reference_type,
            actor: self.actor,
            supplier_id: self.supplier_id.or(record.supplier_id),
            customer_id: self.customer_id,
            status: TransactionStatus::Completed,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One record mutation plus its audit entry
#[derive(Debug, Clone)]
pub struct StockChange {
    pub target: RecordTarget,
    pub adjustment: StockAdjustment,
    pub transaction: TransactionDraft,
    /// Transaction this change compensates; marked `reversed` on commit
    pub reverses: Option<Uuid>,
}

/// Outcome of one applied [`StockChange`]
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub record: InventoryRecord,
    pub transaction: TransactionLogEntry,
    pub change: QuantityChange,
    pub created: bool,
}

/// Filter for record queries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: Option<InventoryStatus>,
}

impl RecordFilter {
    pub fn product(product_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn location(location_id: Uuid) -> Self {
        Self {
            location_id: Some(location_id),
            ..Default::default()
        }
    }

    pub fn at(product_id: Uuid, location_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            location_id: Some(location_id),
            status: None,
        }
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.product_id.map_or(true, |p| record.product_id == p)
            && self.location_id.map_or(true, |l| record.location_id == l)
            && self.status.map_or(true, |s| record.status == s)
    }
}

/// Generic collection store behind the inventory service
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // Locations
    async fn insert_location(&self, location: Location) -> AppResult<Location>;
    async fn get_location(&self, id: Uuid) -> AppResult<Option<Location>>;
    async fn list_locations(&self) -> AppResult<Vec<Location>>;

    // Products
    async fn upsert_product(&self, product: Product) -> AppResult<Product>;
    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>>;
    async fn list_products(&self) -> AppResult<Vec<Product>>;

    // Inventory records
    async fn find_records(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>>;
    async fn find_by_serial(&self, serial_number: &str) -> AppResult<Option<InventoryRecord>>;
    async fn set_record_status(
        &self,
        id: Uuid,
        status: InventoryStatus,
        actor: Uuid,
        notes: Option<String>,
    ) -> AppResult<InventoryRecord>;

    /// Apply every change atomically, in order
    async fn apply_changes(&self, changes: Vec<StockChange>) -> AppResult<Vec<AppliedChange>>;

    // Transaction log
    async fn get_transaction(&self, id: Uuid) -> AppResult<Option<TransactionLogEntry>>;
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<TransactionLogEntry>>;

    // Reorder alerts
    /// Insert unless an open alert exists for the same (product, location)
    async fn insert_alert_if_none_open(
        &self,
        alert: ReorderAlert,
    ) -> AppResult<Option<ReorderAlert>>;
    async fn get_alert(&self, id: Uuid) -> AppResult<Option<ReorderAlert>>;
    /// Persist a status change; `false` if the stored status is no longer `expected`
    async fn update_alert(&self, alert: &ReorderAlert, expected: AlertStatus) -> AppResult<bool>;
    async fn list_alerts(&self, filter: &AlertFilter) -> AppResult<Vec<ReorderAlert>>;
}
