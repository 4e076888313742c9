//! PostgreSQL store
//!
//! `apply_changes` runs inside one database transaction and locks every
//! touched record with `SELECT ... FOR UPDATE`, so concurrent updates of the
//! same record serialize instead of losing deltas. Denormalized totals are
//! recomputed under a product or location row lock taken in id order.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    Address, AlertFilter, AlertHistoryEntry, AlertStatus, GeoCoordinates, InventoryRecord,
    InventoryStatus, Location, MovementEntry, Product, ReorderAlert, TransactionFilter,
    TransactionLogEntry, TransactionStatus,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AppliedChange, InventoryStore, RecordFilter, RecordTarget, StockChange};
use crate::error::{AppError, AppResult};

const LOCATION_COLUMNS: &str = "id, name, code, location_type, address, capacity, current_usage, \
     manager, contact, operating_hours, latitude, longitude, is_active, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, name, sku, supplier_id, stock, reorder_threshold, \
     reorder_quantity, lead_time_days, track_inventory, is_active, updated_at";

const RECORD_COLUMNS: &str = "id, product_id, location_id, quantity, batch_number, serial_numbers, \
     expiration_date, received_date, last_updated, status, cost_price, supplier_id, \
     movement_history, version";

const TRANSACTION_COLUMNS: &str = "id, transaction_type, product_id, location_id, record_id, \
     from_location, to_location, quantity, applied_delta, unit_price, total_value, batch_number, \
     serial_numbers, reference_id, reference_type, actor, supplier_id, customer_id, status, notes, created_at, \
     updated_at";

const ALERT_COLUMNS: &str = "id, product_id, location_id, threshold, current_stock, status, \
     priority, triggered_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by, \
     suggested_quantity, lead_time_days, supplier_id, alert_history";

/// Row for location queries
#[derive(Debug, FromRow)]
struct LocationRow {
    id: Uuid,
    name: String,
    code: String,
    location_type: String,
    address: Option<Json<Address>>,
    capacity: Option<i64>,
    current_usage: i64,
    manager: Option<String>,
    contact: Option<String>,
    operating_hours: Option<String>,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LocationRow> for Location {
    type Error = AppError;

    fn try_from(row: LocationRow) -> AppResult<Self> {
        let coordinates = match (row.latitude, row.longitude) {
            (Some(lat), Some(lng)) => Some(GeoCoordinates::new(lat, lng)),
            _ => None,
        };
        Ok(Location {
            id: row.id,
            name: row.name,
            code: row.code,
            location_type: row.location_type.parse()?,
            address: row.address.map(|a| a.0),
            capacity: row.capacity,
            current_usage: row.current_usage,
            manager: row.manager,
            contact: row.contact,
            operating_hours: row.operating_hours,
            coordinates,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row for product queries
#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    sku: Option<String>,
    supplier_id: Option<Uuid>,
    stock: i64,
    reorder_threshold: i64,
    reorder_quantity: Option<i64>,
    lead_time_days: Option<i32>,
    track_inventory: bool,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            sku: row.sku,
            supplier_id: row.supplier_id,
            stock: row.stock,
            reorder_threshold: row.reorder_threshold,
            reorder_quantity: row.reorder_quantity,
            lead_time_days: row.lead_time_days,
            track_inventory: row.track_inventory,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

/// Row for inventory record queries
#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    product_id: Uuid,
    location_id: Uuid,
    quantity: i64,
    batch_number: Option<String>,
    serial_numbers: Vec<String>,
    expiration_date: Option<DateTime<Utc>>,
    received_date: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    status: String,
    cost_price: Decimal,
    supplier_id: Option<Uuid>,
    movement_history: Json<Vec<MovementEntry>>,
    version: i64,
}

impl TryFrom<RecordRow> for InventoryRecord {
    type Error = AppError;

    fn try_from(row: RecordRow) -> AppResult<Self> {
        Ok(InventoryRecord {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            quantity: row.quantity,
            batch_number: row.batch_number,
            serial_numbers: row.serial_numbers,
            expiration_date: row.expiration_date,
            received_date: row.received_date,
            last_updated: row.last_updated,
            status: row.status.parse()?,
            cost_price: row.cost_price,
            supplier_id: row.supplier_id,
            movement_history: row.movement_history.0,
            version: row.version,
        })
    }
}

/// Row for transaction log queries
#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_type: String,
    product_id: Uuid,
    location_id: Uuid,
    record_id: Uuid,
    from_location: Option<Uuid>,
    to_location: Option<Uuid>,
    quantity: i64,
    applied_delta: i64,
    unit_price: Option<Decimal>,
    total_value: Option<Decimal>,
    batch_number: Option<String>,
    serial_numbers: Vec<String>,
    reference_id: Option<String>,
    reference_type: Option<String>,
    actor: Uuid,
    supplier_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionLogEntry {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> AppResult<Self> {
        Ok(TransactionLogEntry {
            id: row.id,
            transaction_type: row.transaction_type.parse()?,
            product_id: row.product_id,
            location_id: row.location_id,
            record_id: row.record_id,
            from_location: row.from_location,
            to_location: row.to_location,
            quantity: row.quantity,
            applied_delta: row.applied_delta,
            unit_price: row.unit_price,
            total_value: row.total_value,
            batch_number: row.batch_number,
            serial_numbers: row.serial_numbers,
            reference_id: row.reference_id,
            reference_type: row.reference_type,
            actor: row.actor,
            supplier_id: row.supplier_id,
            customer_id: row.customer_id,
            status: row.status.parse()?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row for reorder alert queries
#[derive(Debug, FromRow)]
struct AlertRow {
    id: Uuid,
    product_id: Uuid,
    location_id: Option<Uuid>,
    threshold: i64,
    current_stock: i64,
    status: String,
    priority: String,
    triggered_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
    suggested_quantity: i64,
    lead_time_days: i32,
    supplier_id: Option<Uuid>,
    alert_history: Json<Vec<AlertHistoryEntry>>,
}

impl TryFrom<AlertRow> for ReorderAlert {
    type Error = AppError;

    fn try_from(row: AlertRow) -> AppResult<Self> {
        Ok(ReorderAlert {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            threshold: row.threshold,
            current_stock: row.current_stock,
            status: row.status.parse()?,
            priority: row.priority.parse()?,
            triggered_at: row.triggered_at,
            acknowledged_at: row.acknowledged_at,
            acknowledged_by: row.acknowledged_by,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            suggested_quantity: row.suggested_quantity,
            lead_time_days: row.lead_time_days,
            supplier_id: row.supplier_id,
            alert_history: row.alert_history.0,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|e| e.code()),
        Some(code) if code == "23505"
    )
}

fn collect<R, T>(rows: Vec<R>) -> AppResult<Vec<T>>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgInventoryStore {
    db: PgPool,
}

impl PgInventoryStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn lock_record(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<InventoryRecord>> {
    let row = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {} FROM inventory_records WHERE id = $1 FOR UPDATE",
        RECORD_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(InventoryRecord::try_from).transpose()
}

async fn lock_scope(
    conn: &mut PgConnection,
    template: &InventoryRecord,
) -> AppResult<Option<InventoryRecord>> {
    let row = sqlx::query_as::<_, RecordRow>(&format!(
        r#"
        SELECT {} FROM inventory_records
        WHERE product_id = $1 AND location_id = $2
          AND COALESCE(batch_number, '') = COALESCE($3, '')
        FOR UPDATE
        "#,
        RECORD_COLUMNS
    ))
    .bind(template.product_id)
    .bind(template.location_id)
    .bind(&template.batch_number)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(InventoryRecord::try_from).transpose()
}

/// Insert unless the (product, location, batch) scope is taken; `true` if inserted
async fn insert_record(conn: &mut PgConnection, record: &InventoryRecord) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO inventory_records (
            id, product_id, location_id, quantity, batch_number, serial_numbers,
            expiration_date, received_date, last_updated, status, cost_price, supplier_id,
            movement_history, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(record.product_id)
    .bind(record.location_id)
    .bind(record.quantity)
    .bind(&record.batch_number)
    .bind(&record.serial_numbers)
    .bind(record.expiration_date)
    .bind(record.received_date)
    .bind(record.last_updated)
    .bind(record.status.as_str())
    .bind(record.cost_price)
    .bind(record.supplier_id)
    .bind(Json(&record.movement_history))
    .bind(record.version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn update_record(conn: &mut PgConnection, record: &InventoryRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE inventory_records
        SET quantity = $1, serial_numbers = $2, status = $3, last_updated = $4,
            movement_history = $5, version = $6
        WHERE id = $7
        "#,
    )
    .bind(record.quantity)
    .bind(&record.serial_numbers)
    .bind(record.status.as_str())
    .bind(record.last_updated)
    .bind(Json(&record.movement_history))
    .bind(record.version)
    .bind(record.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_transaction(conn: &mut PgConnection, entry: &TransactionLogEntry) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            id, transaction_type, product_id, location_id, record_id, from_location, to_location,
            quantity, applied_delta, unit_price, total_value, batch_number, serial_numbers,
            reference_id, reference_type, actor, supplier_id, customer_id, status, notes,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
        "#,
    )
    .bind(entry.id)
    .bind(entry.transaction_type.as_str())
    .bind(entry.product_id)
    .bind(entry.location_id)
    .bind(entry.record_id)
    .bind(entry.from_location)
    .bind(entry.to_location)
    .bind(entry.quantity)
    .bind(entry.applied_delta)
    .bind(entry.unit_price)
    .bind(entry.total_value)
    .bind(&entry.batch_number)
    .bind(&entry.serial_numbers)
    .bind(&entry.reference_id)
    .bind(&entry.reference_type)
    .bind(entry.actor)
    .bind(entry.supplier_id)
    .bind(entry.customer_id)
    .bind(entry.status.as_str())
    .bind(&entry.notes)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn release_serials(conn: &mut PgConnection, record_id: Uuid, serials: &[String]) -> AppResult<()> {
    if serials.is_empty() {
        return Ok(());
    }
    sqlx::query("DELETE FROM inventory_serials WHERE record_id = $1 AND serial_number = ANY($2)")
        .bind(record_id)
        .bind(serials)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn claim_serials(conn: &mut PgConnection, record_id: Uuid, serials: &[String]) -> AppResult<()> {
    if serials.is_empty() {
        return Ok(());
    }
    let taken = sqlx::query_scalar::<_, String>(
        "SELECT serial_number FROM inventory_serials WHERE serial_number = ANY($1) AND record_id <> $2 LIMIT 1",
    )
    .bind(serials)
    .bind(record_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(serial) = taken {
        return Err(AppError::DuplicateSerial(serial));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO inventory_serials (serial_number, record_id)
        SELECT s, $2 FROM UNNEST($1::text[]) AS s
        ON CONFLICT (serial_number) DO NOTHING
        "#,
    )
    .bind(serials)
    .bind(record_id)
    .execute(&mut *conn)
    .await?;
    if (result.rows_affected() as usize) < serials.len() {
        return Err(AppError::DuplicateSerial(serials.join(", ")));
    }
    Ok(())
}

async fn mark_reversed(conn: &mut PgConnection, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_transactions SET status = 'reversed', updated_at = $2
        WHERE id = $1 AND status IN ('pending', 'completed')
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 1 {
        return Ok(());
    }

    let status = sqlx::query_scalar::<_, String>("SELECT status FROM inventory_transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Transaction"))?;
    Err(AppError::InvalidStateTransition(format!(
        "transaction {} is {}",
        id, status
    )))
}

async fn recompute_totals(
    conn: &mut PgConnection,
    products: &BTreeSet<Uuid>,
    locations: &BTreeSet<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    // Lock in id order with a separate statement: the SUM must take its
    // snapshot after the lock is granted.
    for product_id in products {
        sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"
            UPDATE products
            SET stock = (SELECT COALESCE(SUM(quantity), 0) FROM inventory_records WHERE product_id = $1),
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    for location_id in locations {
        sqlx::query("SELECT id FROM locations WHERE id = $1 FOR UPDATE")
            .bind(location_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"
            UPDATE locations
            SET current_usage = (SELECT COALESCE(SUM(quantity), 0) FROM inventory_records WHERE location_id = $1),
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(location_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
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
impl InventoryStore for PgInventoryStore {
    async fn insert_location(&self, location: Location) -> AppResult<Location> {
        let (latitude, longitude) = match &location.coordinates {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };
        let result = sqlx::query(
            r#"
            INSERT INTO locations (
                id, name, code, location_type, address, capacity, current_usage, manager,
                contact, operating_hours, latitude, longitude, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(location.id)
        .bind(&location.name)
        .bind(&location.code)
        .bind(location.location_type.as_str())
        .bind(location.address.as_ref().map(Json))
        .bind(location.capacity)
        .bind(location.current_usage)
        .bind(&location.manager)
        .bind(&location.contact)
        .bind(&location.operating_hours)
        .bind(latitude)
        .bind(longitude)
        .bind(location.is_active)
        .bind(location.created_at)
        .bind(location.updated_at)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(location),
            Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateEntry(format!(
                "location code {}",
                location.code
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_location(&self, id: Uuid) -> AppResult<Option<Location>> {
        let row = sqlx::query_as::<_, LocationRow>(&format!(
            "SELECT {} FROM locations WHERE id = $1",
            LOCATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Location::try_from).transpose()
    }

    async fn list_locations(&self) -> AppResult<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(&format!(
            "SELECT {} FROM locations ORDER BY code",
            LOCATION_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        collect(rows)
    }

    async fn upsert_product(&self, product: Product) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (
                id, name, sku, supplier_id, reorder_threshold, reorder_quantity,
                lead_time_days, track_inventory, is_active, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, sku = EXCLUDED.sku, supplier_id = EXCLUDED.supplier_id,
                reorder_threshold = EXCLUDED.reorder_threshold,
                reorder_quantity = EXCLUDED.reorder_quantity,
                lead_time_days = EXCLUDED.lead_time_days,
                track_inventory = EXCLUDED.track_inventory,
                is_active = EXCLUDED.is_active, updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.supplier_id)
        .bind(product.reorder_threshold)
        .bind(product.reorder_quantity)
        .bind(product.lead_time_days)
        .bind(product.track_inventory)
        .bind(product.is_active)
        .bind(product.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_records(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM inventory_records WHERE TRUE",
            RECORD_COLUMNS
        ));
        if let Some(product_id) = filter.product_id {
            query.push(" AND product_id = ").push_bind(product_id);
        }
        if let Some(location_id) = filter.location_id {
            query.push(" AND location_id = ").push_bind(location_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY received_date, id");

        let rows = query
            .build_query_as::<RecordRow>()
            .fetch_all(&self.db)
            .await?;
        collect(rows)
    }

    async fn find_by_serial(&self, serial_number: &str) -> AppResult<Option<InventoryRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {} FROM inventory_records
            WHERE id = (SELECT record_id FROM inventory_serials WHERE serial_number = $1)
            "#,
            RECORD_COLUMNS
        ))
        .bind(serial_number)
        .fetch_optional(&self.db)
        .await?;
        row.map(InventoryRecord::try_from).transpose()
    }

    async fn set_record_status(
        &self,
        id: Uuid,
        status: InventoryStatus,
        actor: Uuid,
        notes: Option<String>,
    ) -> AppResult<InventoryRecord> {
        let mut tx = self.db.begin().await?;
        let mut record = lock_record(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("Inventory record"))?;
        record.set_status(status, actor, notes, Utc::now());
        update_record(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn apply_changes(&self, changes: Vec<StockChange>) -> AppResult<Vec<AppliedChange>> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();
        let mut applied = Vec::with_capacity(changes.len());
        let mut products = BTreeSet::new();
        let mut locations = BTreeSet::new();

        for change in changes {
            let (mut record, created) = match change.target {
                RecordTarget::Existing(id) => {
                    let record = lock_record(&mut tx, id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Inventory record"))?;
                    (record, false)
                }
                RecordTarget::FindOrCreate(template) => {
                    if insert_record(&mut tx, &template).await? {
                        (template, true)
                    } else {
                        let record = lock_scope(&mut tx, &template)
                            .await?
                            .ok_or_else(|| AppError::Internal("record scope vanished".into()))?;
                        (record, false)
                    }
                }
                RecordTarget::CreateNew(template) => {
                    if !insert_record(&mut tx, &template).await? {
                        return Err(duplicate_batch(&template));
                    }
                    (template, true)
                }
            };

            if let Some(reversed_id) = change.reverses {
                mark_reversed(&mut tx, reversed_id, now).await?;
            }

            let quantity_change = record.apply(&change.adjustment, now)?;
            release_serials(&mut tx, record.id, &change.adjustment.remove_serials).await?;
            claim_serials(&mut tx, record.id, &change.adjustment.add_serials).await?;
            update_record(&mut tx, &record).await?;

            let transaction = change.transaction.into_entry(&record, &quantity_change, now);
            insert_transaction(&mut tx, &transaction).await?;

            products.insert(record.product_id);
            locations.insert(record.location_id);
            applied.push(AppliedChange {
                record,
                transaction,
                change: quantity_change,
                created,
            });
        }

        recompute_totals(&mut tx, &products, &locations, now).await?;
        tx.commit().await?;

        Ok(applied)
    }

    async fn get_transaction(&self, id: Uuid) -> AppResult<Option<TransactionLogEntry>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(TransactionLogEntry::try_from).transpose()
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<TransactionLogEntry>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM inventory_transactions WHERE TRUE",
            TRANSACTION_COLUMNS
        ));
        if let Some(product_id) = filter.product_id {
            query.push(" AND product_id = ").push_bind(product_id);
        }
        if let Some(location_id) = filter.location_id {
            query.push(" AND location_id = ").push_bind(location_id);
        }
        if let Some(transaction_type) = filter.transaction_type {
            query
                .push(" AND transaction_type = ")
                .push_bind(transaction_type.as_str());
        }
        if let Some(since) = filter.since {
            query.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            query.push(" AND created_at <= ").push_bind(until);
        }
        query.push(" ORDER BY created_at DESC, id");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.db)
            .await?;
        collect(rows)
    }

    async fn insert_alert_if_none_open(
        &self,
        alert: ReorderAlert,
    ) -> AppResult<Option<ReorderAlert>> {
        let result = sqlx::query(
            r#"
            INSERT INTO reorder_alerts (
                id, product_id, location_id, threshold, current_stock, status, priority,
                triggered_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by,
                suggested_quantity, lead_time_days, supplier_id, alert_history
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(alert.product_id)
        .bind(alert.location_id)
        .bind(alert.threshold)
        .bind(alert.current_stock)
        .bind(alert.status.as_str())
        .bind(alert.priority.as_str())
        .bind(alert.triggered_at)
        .bind(alert.acknowledged_at)
        .bind(alert.acknowledged_by)
        .bind(alert.resolved_at)
        .bind(alert.resolved_by)
        .bind(alert.suggested_quantity)
        .bind(alert.lead_time_days)
        .bind(alert.supplier_id)
        .bind(Json(&alert.alert_history))
        .execute(&self.db)
        .await?;

        Ok((result.rows_affected() == 1).then_some(alert))
    }

    async fn get_alert(&self, id: Uuid) -> AppResult<Option<ReorderAlert>> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM reorder_alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(ReorderAlert::try_from).transpose()
    }

    async fn update_alert(&self, alert: &ReorderAlert, expected: AlertStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reorder_alerts
            SET status = $1, acknowledged_at = $2, acknowledged_by = $3,
                resolved_at = $4, resolved_by = $5, alert_history = $6
            WHERE id = $7 AND status = $8
            "#,
        )
        .bind(alert.status.as_str())
        .bind(alert.acknowledged_at)
        .bind(alert.acknowledged_by)
        .bind(alert.resolved_at)
        .bind(alert.resolved_by)
        .bind(Json(&alert.alert_history))
        .bind(alert.id)
        .bind(expected.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM reorder_alerts WHERE id = $1)")
            .bind(alert.id)
            .fetch_one(&self.db)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(AppError::not_found("Reorder alert"))
        }
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> AppResult<Vec<ReorderAlert>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM reorder_alerts WHERE TRUE",
            ALERT_COLUMNS
        ));
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(product_id) = filter.product_id {
            query.push(" AND product_id = ").push_bind(product_id);
        }
        match filter.location_id {
            Some(Some(location_id)) => {
                query.push(" AND location_id = ").push_bind(location_id);
            }
            Some(None) => {
                query.push(" AND location_id IS NULL");
            }
            None => {}
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        query.push(" ORDER BY triggered_at DESC");

        let rows = query
            .build_query_as::<AlertRow>()
            .fetch_all(&self.db)
            .await?;
        collect(rows)
    }
}
