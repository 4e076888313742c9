//! Inventory record models and the balance arithmetic shared by every store

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current stock of a product at a location, optionally scoped by batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i64,
    pub batch_number: Option<String>,
    /// Globally unique serials; when non-empty, `quantity` equals their count
    pub serial_numbers: Vec<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub received_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: InventoryStatus,
    pub cost_price: Decimal,
    pub supplier_id: Option<Uuid>,
    pub movement_history: Vec<MovementEntry>,
    /// Incremented on every mutation
    pub version: i64,
}

/// Condition of the stock held by a record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    #[default]
    Active,
    Quarantined,
    Expired,
    Damaged,
    Reserved,
}

impl InventoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryStatus::Active => "active",
            InventoryStatus::Quarantined => "quarantined",
            InventoryStatus::Expired => "expired",
            InventoryStatus::Damaged => "damaged",
            InventoryStatus::Reserved => "reserved",
        }
    }
}

impl std::str::FromStr for InventoryStatus {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InventoryStatus::Active),
            "quarantined" => Ok(InventoryStatus::Quarantined),
            "expired" => Ok(InventoryStatus::Expired),
            "damaged" => Ok(InventoryStatus::Damaged),
            "reserved" => Ok(InventoryStatus::Reserved),
            other => Err(crate::ParseEnumError::new("inventory status", other)),
        }
    }
}

/// One entry of a record's append-only movement log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovementEntry {
    pub movement_type: MovementType,
    /// Signed change actually applied to the record
    pub quantity: i64,
    pub from_location: Option<Uuid>,
    pub to_location: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub actor: Uuid,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Received,
    Sale,
    TransferOut,
    TransferIn,
    Adjustment,
    Return,
    Damage,
    WriteOff,
    SerialTracking,
    StatusChange,
    Reversal,
}

/// What to do when a decrement exceeds the available quantity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverdrawPolicy {
    /// Floor the balance at zero and keep going
    #[default]
    Clamp,
    /// Refuse the change
    Reject,
}

impl std::str::FromStr for OverdrawPolicy {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clamp" => Ok(OverdrawPolicy::Clamp),
            "reject" => Ok(OverdrawPolicy::Reject),
            other => Err(crate::ParseEnumError::new("overdraw policy", other)),
        }
    }
}

/// Reasons a stock adjustment cannot be applied to a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StockError {
    #[error("insufficient stock: {available} available, {requested} requested")]
    Insufficient { available: i64, requested: i64 },

    #[error("record version {actual} does not match expected {expected}")]
    VersionMismatch { expected: i64, actual: i64 },

    #[error("serial number {0} is already tracked")]
    SerialAlreadyPresent(String),

    #[error("serial number {0} is not held by this record")]
    SerialNotFound(String),

    #[error("record tracks serial numbers; quantity changes must name them")]
    SerialsRequired,

    #[error("record holds {0} units without serial numbers")]
    UntrackedUnits(i64),

    #[error("quantity overflow")]
    Overflow,
}

/// A single change to apply to one record
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub delta: i64,
    pub policy: OverdrawPolicy,
    pub expected_version: Option<i64>,
    pub add_serials: Vec<String>,
    pub remove_serials: Vec<String>,
    pub movement_type: MovementType,
    pub from_location: Option<Uuid>,
    pub to_location: Option<Uuid>,
    pub actor: Uuid,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl StockAdjustment {
    pub fn new(delta: i64, movement_type: MovementType, actor: Uuid) -> Self {
        Self {
            delta,
            policy: OverdrawPolicy::Clamp,
            expected_version: None,
            add_serials: Vec::new(),
            remove_serials: Vec::new(),
            movement_type,
            from_location: None,
            to_location: None,
            actor,
            reference: None,
            notes: None,
        }
    }

    fn touches_serials(&self) -> bool {
        !self.add_serials.is_empty() || !self.remove_serials.is_empty()
    }
}

/// Balance before and after an applied adjustment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuantityChange {
    pub old_quantity: i64,
    pub new_quantity: i64,
}

impl QuantityChange {
    pub fn applied_delta(&self) -> i64 {
        self.new_quantity - self.old_quantity
    }

    pub fn was_clamped(&self, requested_delta: i64) -> bool {
        self.applied_delta() != requested_delta
    }
}

impl InventoryRecord {
    /// Empty record for a product at a location
    pub fn new(
        product_id: Uuid,
        location_id: Uuid,
        batch_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            location_id,
            quantity: 0,
            batch_number,
            serial_numbers: Vec::new(),
            expiration_date: None,
            received_date: now,
            last_updated: now,
            status: InventoryStatus::Active,
            cost_price: Decimal::ZERO,
            supplier_id: None,
            movement_history: Vec::new(),
            version: 0,
        }
    }

    /// Whether quantity is derived from the serial set
    pub fn tracks_serials(&self) -> bool {
        !self.serial_numbers.is_empty()
    }

    pub fn value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.cost_price
    }

    /// Same (product, location, batch) scope
    pub fn same_scope(&self, product_id: Uuid, location_id: Uuid, batch_number: Option<&str>) -> bool {
        self.product_id == product_id
            && self.location_id == location_id
            && self.batch_number.as_deref() == batch_number
    }

    pub fn days_in_stock(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_date).num_days().max(0)
    }

    /// Apply an adjustment in place.
    ///
    /// On error the record is left untouched. Serial-tracked records derive
    /// their quantity from the serial set and ignore `delta`.
    pub fn apply(
        &mut self,
        adjustment: &StockAdjustment,
        now: DateTime<Utc>,
    ) -> Result<QuantityChange, StockError> {
        if let Some(expected) = adjustment.expected_version {
            if expected != self.version {
                return Err(StockError::VersionMismatch {
                    expected,
                    actual: self.version,
                });
            }
        }

        let old_quantity = self.quantity;
        let serial_mode = self.tracks_serials() || adjustment.touches_serials();

        let (new_quantity, serials) = if serial_mode {
            if self.tracks_serials() && adjustment.delta != 0 && !adjustment.touches_serials() {
                return Err(StockError::SerialsRequired);
            }
            // Serials would replace the count and silently drop these units
            if !self.tracks_serials() && self.quantity > 0 {
                return Err(StockError::UntrackedUnits(self.quantity));
            }
            let mut serials = self.serial_numbers.clone();
            for serial in &adjustment.remove_serials {
                let position = serials
                    .iter()
                    .position(|s| s == serial)
                    .ok_or_else(|| StockError::SerialNotFound(serial.clone()))?;
                serials.remove(position);
            }
            for serial in &adjustment.add_serials {
                if serials.contains(serial) {
                    return Err(StockError::SerialAlreadyPresent(serial.clone()));
                }
                serials.push(serial.clone());
            }
            (serials.len() as i64, Some(serials))
        } else {
            let candidate = old_quantity
                .checked_add(adjustment.delta)
                .ok_or(StockError::Overflow)?;
            if candidate >= 0 {
                (candidate, None)
            } else {
                match adjustment.policy {
                    OverdrawPolicy::Clamp => (0, None),
                    OverdrawPolicy::Reject => {
                        return Err(StockError::Insufficient {
                            available: old_quantity,
                            requested: -adjustment.delta,
                        })
                    }
                }
            }
        };

        if let Some(serials) = serials {
            self.serial_numbers = serials;
        }
        self.quantity = new_quantity;
        self.version += 1;
        self.last_updated = now;
        self.movement_history.push(MovementEntry {
            movement_type: adjustment.movement_type,
            quantity: new_quantity - old_quantity,
            from_location: adjustment.from_location,
            to_location: adjustment.to_location,
            timestamp: now,
            actor: adjustment.actor,
            reference: adjustment.reference.clone(),
            notes: adjustment.notes.clone(),
        });

        Ok(QuantityChange {
            old_quantity,
            new_quantity,
        })
    }

    /// Move the record to another status, logging the change
    pub fn set_status(
        &mut self,
        status: InventoryStatus,
        actor: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        let note = match notes {
            Some(n) => format!("{} -> {}: {}", self.status.as_str(), status.as_str(), n),
            None => format!("{} -> {}", self.status.as_str(), status.as_str()),
        };
        self.status = status;
        self.version += 1;
        self.last_updated = now;
        self.movement_history.push(MovementEntry {
            movement_type: MovementType::StatusChange,
            quantity: 0,
            from_location: None,
            to_location: None,
            timestamp: now,
            actor,
            reference: None,
            notes: Some(note),
        });
    }
}
