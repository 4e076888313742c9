//! In-memory store
//!
//! One mutex guards the whole state, so every call is serialized. Changes are
//! staged on copies and only written back once all of them validated.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    AlertFilter, AlertStatus, InventoryRecord, InventoryStatus, Location, Product, ReorderAlert,
    TransactionFilter, TransactionLogEntry, TransactionStatus,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AppliedChange, InventoryStore, RecordFilter, RecordTarget, StockChange};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct State {
    locations: HashMap<Uuid, Location>,
    products: HashMap<Uuid, Product>,
    records: HashMap<Uuid, InventoryRecord>,
    /// serial number -> owning record
    serials: HashMap<String, Uuid>,
    transactions: Vec<TransactionLogEntry>,
    alerts: Vec<ReorderAlert>,
}

impl State {
    fn find_scope<'a>(
        &'a self,
        staged: &'a HashMap<Uuid, InventoryRecord>,
        template: &InventoryRecord,
    ) -> Option<&'a InventoryRecord> {
        let batch = template.batch_number.as_deref();
        staged
            .values()
            .chain(self.records.values())
            .find(|r| r.same_scope(template.product_id, template.location_id, batch))
    }

    fn recompute_totals(
        &mut self,
        products: &HashSet<Uuid>,
        locations: &HashSet<Uuid>,
        now: DateTime<Utc>,
    ) {
        for product_id in products {
            let total: i64 = self
                .records
                .values()
                .filter(|r| r.product_id == *product_id)
                .map(|r| r.quantity)
                .sum();
            if let Some(product) = self.products.get_mut(product_id) {
                product.stock = total;
                product.updated_at = now;
            }
        }
        for location_id in locations {
            let usage: i64 = self
                .records
                .values()
                .filter(|r| r.location_id == *location_id)
                .map(|r| r.quantity)
                .sum();
            if let Some(location) = self.locations.get_mut(location_id) {
                location.current_usage = usage;
                location.updated_at = now;
            }
        }
    }
}

/// Process-local store used by tests and single-node tooling
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate_batch(record: &InventoryRecord) -> AppError {
    AppError::DuplicateBatch(
        record
            .batch_number
            .clone()
            .unwrap_or_else(|| "(unbatched)".to_string()),
    )
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn insert_location(&self, location: Location) -> AppResult<Location> {
        let mut state = self.state.lock().await;
        if state.locations.values().any(|l| l.code == location.code) {
            return Err(AppError::DuplicateEntry(format!("location code {}", location.code)));
        }
        state.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn get_location(&self, id: Uuid) -> AppResult<Option<Location>> {
        Ok(self.state.lock().await.locations.get(&id).cloned())
    }

    async fn list_locations(&self) -> AppResult<Vec<Location>> {
        let state = self.state.lock().await;
        let mut locations: Vec<Location> = state.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(locations)
    }

    async fn upsert_product(&self, product: Product) -> AppResult<Product> {
        let mut state = self.state.lock().await;
        // Stock is owned by the write path, never by the catalog
        let stock: i64 = state
            .records
            .values()
            .filter(|r| r.product_id == product.id)
            .map(|r| r.quantity)
            .sum();
        let product = Product { stock, ..product };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn find_records(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<InventoryRecord> = state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.received_date.cmp(&b.received_date).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn find_by_serial(&self, serial_number: &str) -> AppResult<Option<InventoryRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .serials
            .get(serial_number)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn set_record_status(
        &self,
        id: Uuid,
        status: InventoryStatus,
        actor: Uuid,
        notes: Option<String>,
    ) -> AppResult<InventoryRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Inventory record"))?;
        record.set_status(status, actor, notes, Utc::now());
        Ok(record.clone())
    }

    async fn apply_changes(&self, changes: Vec<StockChange>) -> AppResult<Vec<AppliedChange>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut staged: HashMap<Uuid, InventoryRecord> = HashMap::new();
        // serial -> new owner, `None` when released
        let mut staged_serials: HashMap<String, Option<Uuid>> = HashMap::new();
        let mut reversals: Vec<Uuid> = Vec::new();
        let mut applied = Vec::with_capacity(changes.len());

        for change in changes {
            let (mut record, created) = match change.target {
                RecordTarget::Existing(id) => {
                    let record = staged
                        .get(&id)
                        .or_else(|| state.records.get(&id))
                        .cloned()
                        .ok_or_else(|| AppError::not_found("Inventory record"))?;
                    (record, false)
                }
                RecordTarget::FindOrCreate(template) => {
                    match state.find_scope(&staged, &template) {
                        Some(existing) => (existing.clone(), false),
                        None => (template, true),
                    }
                }
                RecordTarget::CreateNew(template) => {
                    if let Some(existing) = state.find_scope(&staged, &template) {
                        return Err(duplicate_batch(existing));
                    }
                    (template, true)
                }
            };

            for serial in &change.adjustment.add_serials {
                let owner = match staged_serials.get(serial) {
                    Some(owner) => *owner,
                    None => state.serials.get(serial).copied(),
                };
                if matches!(owner, Some(owner) if owner != record.id) {
                    return Err(AppError::DuplicateSerial(serial.clone()));
                }
            }

            if let Some(reversed_id) = change.reverses {
                let original = state
                    .transactions
                    .iter()
                    .find(|t| t.id == reversed_id)
                    .ok_or_else(|| AppError::not_found("Transaction"))?;
                if !original.status.can_transition_to(TransactionStatus::Reversed)
                    || reversals.contains(&reversed_id)
                {
                    return Err(AppError::InvalidStateTransition(format!(
                        "transaction {} is {}",
                        reversed_id,
                        original.status.as_str()
                    )));
                }
                reversals.push(reversed_id);
            }

            let quantity_change = record.apply(&change.adjustment, now)?;

            for serial in &change.adjustment.remove_serials {
                staged_serials.insert(serial.clone(), None);
            }
            for serial in &change.adjustment.add_serials {
                staged_serials.insert(serial.clone(), Some(record.id));
            }

            let transaction = change.transaction.into_entry(&record, &quantity_change, now);
            staged.insert(record.id, record.clone());
            applied.push(AppliedChange {
                record,
                transaction,
                change: quantity_change,
                created,
            });
        }

        // Everything validated; commit
        let mut products = HashSet::new();
        let mut locations = HashSet::new();
        for (serial, owner) in staged_serials {
            match owner {
                Some(id) => state.serials.insert(serial, id),
                None => state.serials.remove(&serial),
            };
        }
        for (id, record) in staged {
            products.insert(record.product_id);
            locations.insert(record.location_id);
            state.records.insert(id, record);
        }
        for entry in state.transactions.iter_mut() {
            if reversals.contains(&entry.id) {
                entry.status = TransactionStatus::Reversed;
                entry.updated_at = now;
            }
        }
        state
            .transactions
            .extend(applied.iter().map(|a| a.transaction.clone()));
        state.recompute_totals(&products, &locations, now);

        Ok(applied)
    }

    async fn get_transaction(&self, id: Uuid) -> AppResult<Option<TransactionLogEntry>> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<TransactionLogEntry>> {
        let state = self.state.lock().await;
        // Newest first, like the SQL store
        let entries = state
            .transactions
            .iter()
            .rev()
            .filter(|t| filter.matches(t))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(entries)
    }

    async fn insert_alert_if_none_open(
        &self,
        alert: ReorderAlert,
    ) -> AppResult<Option<ReorderAlert>> {
        let mut state = self.state.lock().await;
        let open = state.alerts.iter().any(|a| {
            a.product_id == alert.product_id
                && a.location_id == alert.location_id
                && a.status.is_open()
        });
        if open {
            return Ok(None);
        }
        state.alerts.push(alert.clone());
        Ok(Some(alert))
    }

    async fn get_alert(&self, id: Uuid) -> AppResult<Option<ReorderAlert>> {
        let state = self.state.lock().await;
        Ok(state.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn update_alert(&self, alert: &ReorderAlert, expected: AlertStatus) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(stored) if stored.status == expected => {
                *stored = alert.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::not_found("Reorder alert")),
        }
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> AppResult<Vec<ReorderAlert>> {
        let state = self.state.lock().await;
        let mut alerts: Vec<ReorderAlert> = state
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        Ok(alerts)
    }
}
