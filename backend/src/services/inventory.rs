//! Inventory service: the write path for stock plus the cached read views
//!
//! Every stock-changing operation is built as a list of [`StockChange`]s and
//! handed to the store in one `apply_changes` call, so a transfer's two legs,
//! the audit entries and the denormalized totals commit together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    validate_batch_number, validate_cost_price, validate_positive_quantity,
    validate_serial_numbers, validate_threshold, Actor, InventoryRecord, InventoryStatus,
    Location, LocationInventory, MovementType, NewLocation, OverdrawPolicy, Product,
    ProductInventory, SerialLocation, StockAdjustment, TransactionFilter, TransactionLogEntry,
    TransactionStatus, TransactionType,
};
use uuid::Uuid;
use validator::Validate;

use super::cache::{CacheKey, CachedView, ReadCache};
use super::notification::{EventPublisher, InventoryEvent};
use crate::error::{AppError, AppResult};
use crate::store::{AppliedChange, InventoryStore, RecordFilter, RecordTarget, StockChange, TransactionDraft};

/// Optional fields of `update_quantity`
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub transaction_type: TransactionType,
    pub actor: Actor,
    pub batch_number: Option<String>,
    /// Serials leaving (negative delta) or entering (positive delta) the record
    pub serial_numbers: Vec<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub notes: Option<String>,
    /// Unit price recorded on the transaction log entry
    pub cost_price: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    /// Counterpart location of the movement, if any
    pub to_location_id: Option<Uuid>,
    /// Falls back to the service default
    pub policy: Option<OverdrawPolicy>,
    pub expected_version: Option<i64>,
}

impl UpdateOptions {
    pub fn new(transaction_type: TransactionType, actor: Actor) -> Self {
        Self {
            transaction_type,
            actor,
            batch_number: None,
            serial_numbers: Vec::new(),
            reference_id: None,
            reference_type: None,
            notes: None,
            cost_price: None,
            supplier_id: None,
            customer_id: None,
            to_location_id: None,
            policy: None,
            expected_version: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub batch_number: Option<String>,
    pub serial_numbers: Vec<String>,
    /// Shared by both legs; generated when absent
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

/// Input for receiving a new batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub batch_number: String,
    pub quantity: i64,
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl NewBatch {
    pub fn new(batch_number: impl Into<String>, quantity: i64) -> Self {
        Self {
            batch_number: batch_number.into(),
            quantity,
            expiration_date: None,
            cost_price: Decimal::ZERO,
            serial_numbers: Vec::new(),
            supplier_id: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackSerialsOptions {
    pub batch_number: Option<String>,
    pub notes: Option<String>,
}

/// Outcome of a single-record stock change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
    pub record: InventoryRecord,
    pub transaction: TransactionLogEntry,
    pub old_quantity: i64,
    pub new_quantity: i64,
}

impl From<AppliedChange> for StockUpdate {
    fn from(applied: AppliedChange) -> Self {
        Self {
            record: applied.record,
            transaction: applied.transaction,
            old_quantity: applied.change.old_quantity,
            new_quantity: applied.change.new_quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub reference_id: String,
    pub source: StockUpdate,
    pub destination: StockUpdate,
}

fn check(field: &str, result: Result<(), &'static str>) -> AppResult<()> {
    result.map_err(|msg| AppError::validation(field, msg))
}

/// Orchestrates stock mutations over the store, cache and event sink
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    cache: Arc<dyn ReadCache>,
    publisher: Arc<dyn EventPublisher>,
    default_policy: OverdrawPolicy,
}

impl InventoryService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        cache: Arc<dyn ReadCache>,
        publisher: Arc<dyn EventPublisher>,
        default_policy: OverdrawPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            default_policy,
        }
    }

    // ========================================================================
    // Locations and products
    // ========================================================================

    pub async fn create_location(&self, input: NewLocation) -> AppResult<Location> {
        input.validate()?;
        let location = self.store.insert_location(input.into_location(Utc::now())).await?;
        tracing::info!(location_id = %location.id, code = %location.code, "Location created");
        Ok(location)
    }

    pub async fn get_location(&self, location_id: Uuid) -> AppResult<Location> {
        self.store
            .get_location(location_id)
            .await?
            .ok_or_else(|| AppError::not_found("Location"))
    }

    pub async fn list_locations(&self) -> AppResult<Vec<Location>> {
        self.store.list_locations().await
    }

    /// Register or update the inventory-relevant slice of a catalog product
    pub async fn register_product(&self, product: Product) -> AppResult<Product> {
        if product.name.trim().is_empty() {
            return Err(AppError::validation("name", "Product name is required"));
        }
        check("reorderThreshold", validate_threshold(product.reorder_threshold))?;
        if let Some(quantity) = product.reorder_quantity {
            check("reorderQuantity", validate_positive_quantity(quantity))?;
        }
        if matches!(product.lead_time_days, Some(days) if days < 0) {
            return Err(AppError::validation("leadTimeDays", "Lead time cannot be negative"));
        }

        let product = self.store.upsert_product(product).await?;
        self.cache.invalidate(&CacheKey::Product(product.id)).await;
        Ok(product)
    }

    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::not_found("Product"))
    }

    // ========================================================================
    // Stock mutations
    // ========================================================================

    /// Apply `delta` to the existing record of a product at a location
    pub async fn update_quantity(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        delta: i64,
        options: UpdateOptions,
    ) -> AppResult<StockUpdate> {
        if delta == 0 {
            return Err(AppError::validation("quantity", "Quantity change cannot be zero"));
        }
        if options.to_location_id == Some(location_id) {
            return Err(AppError::validation(
                "toLocationId",
                "Counterpart location must differ from the updated location",
            ));
        }
        if !options.serial_numbers.is_empty() {
            check("serialNumbers", validate_serial_numbers(&options.serial_numbers))?;
            if options.serial_numbers.len() as u64 != delta.unsigned_abs() {
                return Err(AppError::validation(
                    "serialNumbers",
                    "Number of serial numbers must match the quantity change",
                ));
            }
        }

        let record = self
            .resolve_record(product_id, location_id, options.batch_number.as_deref())
            .await?;

        let (from_location, to_location) = if delta < 0 {
            (Some(location_id), options.to_location_id)
        } else {
            (options.to_location_id, Some(location_id))
        };

        let mut adjustment = StockAdjustment::new(
            delta,
            options.transaction_type.movement_type(delta),
            options.actor.id,
        );
        adjustment.policy = options.policy.unwrap_or(self.default_policy);
        adjustment.expected_version = options.expected_version;
        adjustment.from_location = from_location;
        adjustment.to_location = to_location;
        adjustment.reference = options.reference_id.clone();
        adjustment.notes = options.notes.clone();
        if delta < 0 {
            adjustment.remove_serials = options.serial_numbers.clone();
        } else {
            adjustment.add_serials = options.serial_numbers.clone();
        }

        let mut draft = TransactionDraft::new(options.transaction_type, delta.abs(), options.actor.id);
        draft.from_location = from_location;
        draft.to_location = to_location;
        draft.unit_price = options.cost_price;
        draft.serial_numbers = options.serial_numbers;
        draft.reference_id = options.reference_id;
        draft.reference_type = options.reference_type;
        draft.supplier_id = options.supplier_id;
        draft.customer_id = options.customer_id;
        draft.notes = options.notes;

        let applied = self
            .apply_one(StockChange {
                target: RecordTarget::Existing(record.id),
                adjustment,
                transaction: draft,
                reverses: None,
            })
            .await?;

        if applied.change.was_clamped(delta) {
            tracing::warn!(
                product_id = %product_id,
                location_id = %location_id,
                requested = delta,
                applied = applied.change.applied_delta(),
                "Decrement exceeded stock and was clamped at zero"
            );
        }
        tracing::info!(
            product_id = %product_id,
            location_id = %location_id,
            old_quantity = applied.change.old_quantity,
            new_quantity = applied.change.new_quantity,
            transaction_type = options.transaction_type.as_str(),
            "Inventory quantity updated"
        );

        Ok(applied.into())
    }

    /// Move stock between two locations as one atomic unit
    pub async fn transfer(
        &self,
        product_id: Uuid,
        from_location_id: Uuid,
        to_location_id: Uuid,
        quantity: i64,
        actor: Actor,
        options: TransferOptions,
    ) -> AppResult<TransferResult> {
        check("quantity", validate_positive_quantity(quantity))?;
        if from_location_id == to_location_id {
            return Err(AppError::validation(
                "toLocationId",
                "Source and destination locations must differ",
            ));
        }
        if !options.serial_numbers.is_empty() {
            check("serialNumbers", validate_serial_numbers(&options.serial_numbers))?;
            if options.serial_numbers.len() as i64 != quantity {
                return Err(AppError::validation(
                    "serialNumbers",
                    "Number of serial numbers must match the transfer quantity",
                ));
            }
        }

        let source = self
            .resolve_record(product_id, from_location_id, options.batch_number.as_deref())
            .await?;
        if source.quantity < quantity {
            return Err(AppError::InsufficientStock {
                available: source.quantity,
                requested: quantity,
            });
        }
        self.get_location(to_location_id).await?;

        let now = Utc::now();
        let reference_id = options
            .reference_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut destination = InventoryRecord::new(
            product_id,
            to_location_id,
            source.batch_number.clone(),
            now,
        );
        destination.cost_price = source.cost_price;
        destination.supplier_id = source.supplier_id;
        destination.expiration_date = source.expiration_date;

        let leg = |delta: i64, movement_type: MovementType| {
            let mut adjustment = StockAdjustment::new(delta, movement_type, actor.id);
            adjustment.policy = OverdrawPolicy::Reject;
            adjustment.from_location = Some(from_location_id);
            adjustment.to_location = Some(to_location_id);
            adjustment.reference = Some(reference_id.clone());
            adjustment.notes = options.notes.clone();
            if delta < 0 {
                adjustment.remove_serials = options.serial_numbers.clone();
            } else {
                adjustment.add_serials = options.serial_numbers.clone();
            }

            let mut draft = TransactionDraft::new(TransactionType::Transfer, quantity, actor.id);
            draft.from_location = Some(from_location_id);
            draft.to_location = Some(to_location_id);
            draft.unit_price = Some(source.cost_price);
            draft.serial_numbers = options.serial_numbers.clone();
            draft.reference_id = Some(reference_id.clone());
            draft.reference_type = Some("transfer".to_string());
            draft.notes = options.notes.clone();
            (adjustment, draft)
        };

        let (out_adjustment, out_draft) = leg(-quantity, MovementType::TransferOut);
        let (in_adjustment, in_draft) = leg(quantity, MovementType::TransferIn);

        let applied = self
            .apply(vec![
                StockChange {
                    target: RecordTarget::Existing(source.id),
                    adjustment: out_adjustment,
                    transaction: out_draft,
                    reverses: None,
                },
                StockChange {
                    target: RecordTarget::FindOrCreate(destination),
                    adjustment: in_adjustment,
                    transaction: in_draft,
                    reverses: None,
                },
            ])
            .await?;

        let mut legs = applied.into_iter();
        let (source_leg, destination_leg) = match (legs.next(), legs.next()) {
            (Some(source), Some(destination)) => (source, destination),
            _ => return Err(AppError::Internal("transfer applied without both legs".into())),
        };

        tracing::info!(
            product_id = %product_id,
            from_location_id = %from_location_id,
            to_location_id = %to_location_id,
            quantity,
            reference_id = %reference_id,
            "Stock transferred"
        );

        Ok(TransferResult {
            reference_id,
            source: source_leg.into(),
            destination: destination_leg.into(),
        })
    }

    /// Receive a new batch as its own record
    pub async fn add_batch(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        batch: NewBatch,
        actor: Actor,
    ) -> AppResult<StockUpdate> {
        check("batchNumber", validate_batch_number(&batch.batch_number))?;
        check("quantity", validate_positive_quantity(batch.quantity))?;
        check("costPrice", validate_cost_price(batch.cost_price))?;
        if !batch.serial_numbers.is_empty() {
            check("serialNumbers", validate_serial_numbers(&batch.serial_numbers))?;
            if batch.serial_numbers.len() as i64 != batch.quantity {
                return Err(AppError::validation(
                    "serialNumbers",
                    "Number of serial numbers must match the batch quantity",
                ));
            }
        }
        self.get_product(product_id).await?;
        self.get_location(location_id).await?;

        let mut record = InventoryRecord::new(
            product_id,
            location_id,
            Some(batch.batch_number.clone()),
            Utc::now(),
        );
        record.expiration_date = batch.expiration_date;
        record.cost_price = batch.cost_price;
        record.supplier_id = batch.supplier_id;

        let mut adjustment = StockAdjustment::new(batch.quantity, MovementType::Received, actor.id);
        adjustment.to_location = Some(location_id);
        adjustment.reference = Some(batch.batch_number.clone());
        adjustment.notes = batch.notes.clone();
        adjustment.add_serials = batch.serial_numbers.clone();

        let mut draft = TransactionDraft::new(TransactionType::Purchase, batch.quantity, actor.id);
        draft.to_location = Some(location_id);
        draft.unit_price = Some(batch.cost_price);
        draft.serial_numbers = batch.serial_numbers;
        draft.supplier_id = batch.supplier_id;
        draft.notes = batch.notes;

        let applied = self
            .apply_one(StockChange {
                target: RecordTarget::CreateNew(record),
                adjustment,
                transaction: draft,
                reverses: None,
            })
            .await?;

        tracing::info!(
            product_id = %product_id,
            location_id = %location_id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity,
            "Batch received"
        );
        Ok(applied.into())
    }

    /// Attach serial numbers to a record, creating it on first use.
    ///
    /// Once a record tracks serials its quantity is the size of the serial set.
    pub async fn track_serials(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        serial_numbers: Vec<String>,
        options: TrackSerialsOptions,
        actor: Actor,
    ) -> AppResult<StockUpdate> {
        check("serialNumbers", validate_serial_numbers(&serial_numbers))?;
        if let Some(batch) = &options.batch_number {
            check("batchNumber", validate_batch_number(batch))?;
        }
        self.get_product(product_id).await?;
        self.get_location(location_id).await?;

        let template = InventoryRecord::new(
            product_id,
            location_id,
            options.batch_number.clone(),
            Utc::now(),
        );
        let count = serial_numbers.len() as i64;

        let mut adjustment = StockAdjustment::new(count, MovementType::SerialTracking, actor.id);
        adjustment.to_location = Some(location_id);
        adjustment.notes = options.notes.clone();
        adjustment.add_serials = serial_numbers.clone();

        let mut draft = TransactionDraft::new(TransactionType::Adjustment, count, actor.id);
        draft.to_location = Some(location_id);
        draft.serial_numbers = serial_numbers;
        draft.reference_type = Some("serial_tracking".to_string());
        draft.notes = options.notes;

        let applied = self
            .apply_one(StockChange {
                target: RecordTarget::FindOrCreate(template),
                adjustment,
                transaction: draft,
                reverses: None,
            })
            .await?;

        tracing::info!(
            product_id = %product_id,
            location_id = %location_id,
            added = count,
            quantity = applied.change.new_quantity,
            "Serial numbers tracked"
        );
        Ok(applied.into())
    }

    /// Quarantine, damage, expire or reserve a record without moving stock
    pub async fn set_record_status(
        &self,
        record_id: Uuid,
        status: InventoryStatus,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<InventoryRecord> {
        let record = self
            .store
            .set_record_status(record_id, status, actor.id, notes)
            .await?;
        self.invalidate(record.product_id, record.location_id).await;
        tracing::info!(record_id = %record_id, status = status.as_str(), "Record status changed");
        Ok(record)
    }

    /// Undo a logged movement with a compensating entry
    pub async fn reverse_transaction(
        &self,
        transaction_id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<StockUpdate> {
        let original = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction"))?;

        if original.transaction_type == TransactionType::Transfer {
            return Err(AppError::InvalidStateTransition(
                "transfer legs cannot be reversed individually".to_string(),
            ));
        }
        if !original.status.can_transition_to(TransactionStatus::Reversed) {
            return Err(AppError::InvalidStateTransition(format!(
                "transaction {} is {}",
                transaction_id,
                original.status.as_str()
            )));
        }

        // Undo what the entry did to the balance, not what was requested
        let delta = -original.applied_delta;
        if delta == 0 {
            return Err(AppError::InvalidStateTransition(format!(
                "transaction {} moved no stock",
                transaction_id
            )));
        }
        let compensating_type = match original.transaction_type {
            TransactionType::Sale if delta > 0 => TransactionType::Return,
            _ => TransactionType::Adjustment,
        };
        let (from_location, to_location) = if delta < 0 {
            (Some(original.location_id), None)
        } else {
            (None, Some(original.location_id))
        };

        let mut adjustment = StockAdjustment::new(delta, MovementType::Reversal, actor.id);
        adjustment.policy = OverdrawPolicy::Reject;
        adjustment.from_location = from_location;
        adjustment.to_location = to_location;
        adjustment.reference = Some(original.id.to_string());
        adjustment.notes = notes.clone();
        if delta < 0 {
            adjustment.remove_serials = original.serial_numbers.clone();
        } else {
            adjustment.add_serials = original.serial_numbers.clone();
        }

        let mut draft = TransactionDraft::new(compensating_type, delta.abs(), actor.id);
        draft.from_location = from_location;
        draft.to_location = to_location;
        draft.unit_price = original.unit_price;
        draft.serial_numbers = original.serial_numbers.clone();
        draft.reference_id = Some(original.id.to_string());
        draft.reference_type = Some("reversal".to_string());
        draft.supplier_id = original.supplier_id;
        draft.customer_id = original.customer_id;
        draft.notes = notes;

        let applied = self
            .apply_one(StockChange {
                target: RecordTarget::Existing(original.record_id),
                adjustment,
                transaction: draft,
                reverses: Some(original.id),
            })
            .await?;

        tracing::info!(
            transaction_id = %transaction_id,
            compensating_id = %applied.transaction.id,
            "Transaction reversed"
        );
        Ok(applied.into())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn find_serial(&self, serial_number: &str) -> AppResult<SerialLocation> {
        let record = self
            .store
            .find_by_serial(serial_number)
            .await?
            .ok_or_else(|| AppError::not_found("Serial number"))?;
        Ok(SerialLocation::from_record(serial_number, &record))
    }

    pub async fn get_product_inventory(&self, product_id: Uuid) -> AppResult<ProductInventory> {
        let key = CacheKey::Product(product_id);
        let generation = self.cache.generation(&key).await;
        if let Some(CachedView::Product(view)) = self.cache.get(&key).await {
            return Ok(view);
        }

        self.get_product(product_id).await?;
        let records = self.store.find_records(&RecordFilter::product(product_id)).await?;
        let view = ProductInventory::from_records(product_id, &records);
        self.cache.set(key, CachedView::Product(view.clone()), generation).await;
        Ok(view)
    }

    pub async fn get_location_inventory(&self, location_id: Uuid) -> AppResult<LocationInventory> {
        let key = CacheKey::Location(location_id);
        let generation = self.cache.generation(&key).await;
        if let Some(CachedView::Location(view)) = self.cache.get(&key).await {
            return Ok(view);
        }

        self.get_location(location_id).await?;
        let records = self.store.find_records(&RecordFilter::location(location_id)).await?;
        let view = LocationInventory::from_records(location_id, &records);
        self.cache.set(key, CachedView::Location(view.clone()), generation).await;
        Ok(view)
    }

    pub async fn list_records(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        self.store.find_records(filter).await
    }

    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<TransactionLogEntry>> {
        self.store.list_transactions(filter).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Batch-scoped record when a batch is named, otherwise the unbatched
    /// record, falling back to the oldest received one
    async fn resolve_record(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        batch_number: Option<&str>,
    ) -> AppResult<InventoryRecord> {
        let records = self
            .store
            .find_records(&RecordFilter::at(product_id, location_id))
            .await?;

        let found = match batch_number {
            Some(batch) => records
                .into_iter()
                .find(|r| r.batch_number.as_deref() == Some(batch)),
            None => {
                let unbatched = records.iter().position(|r| r.batch_number.is_none());
                match unbatched {
                    Some(index) => records.into_iter().nth(index),
                    // Sorted by received date
                    None => records.into_iter().next(),
                }
            }
        };
        found.ok_or_else(|| AppError::not_found("Inventory record"))
    }

    async fn apply_one(&self, change: StockChange) -> AppResult<AppliedChange> {
        self.apply(vec![change])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("store applied no change".into()))
    }

    async fn apply(&self, changes: Vec<StockChange>) -> AppResult<Vec<AppliedChange>> {
        let applied = self.store.apply_changes(changes).await?;
        for change in &applied {
            self.invalidate(change.record.product_id, change.record.location_id)
                .await;
        }
        for change in &applied {
            self.emit(InventoryEvent::InventoryChanged {
                product_id: change.record.product_id,
                location_id: change.record.location_id,
                old_quantity: change.change.old_quantity,
                new_quantity: change.change.new_quantity,
                transaction_type: change.transaction.transaction_type,
                timestamp: change.transaction.created_at,
            })
            .await;
        }
        Ok(applied)
    }

    async fn invalidate(&self, product_id: Uuid, location_id: Uuid) {
        self.cache.invalidate(&CacheKey::Product(product_id)).await;
        self.cache.invalidate(&CacheKey::Location(location_id)).await;
    }

    async fn emit(&self, event: InventoryEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(error = %e, "Failed to publish inventory event");
        }
    }
}
