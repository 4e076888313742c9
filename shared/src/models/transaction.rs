//! Transaction log models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MovementType;

/// Immutable fact about one stock movement on one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLogEntry {
    pub id: Uuid,
    pub transaction_type: TransactionType,
    pub product_id: Uuid,
    /// Location whose balance this entry moved
    pub location_id: Uuid,
    pub record_id: Uuid,
    pub from_location: Option<Uuid>,
    pub to_location: Option<Uuid>,
    /// Requested magnitude; direction comes from the locations
    pub quantity: i64,
    /// Signed change this entry actually made to its record
    pub applied_delta: i64,
    pub unit_price: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub batch_number: Option<String>,
    pub serial_numbers: Vec<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub actor: Uuid,
    pub supplier_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionLogEntry {
    /// Whether this entry took stock out of `location_id`
    pub fn is_outbound(&self) -> bool {
        self.from_location == Some(self.location_id)
    }

    /// Whether the balance moved by less than was requested
    pub fn was_clamped(&self) -> bool {
        self.applied_delta.abs() != self.quantity
    }
}

/// Kinds of stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    Purchase,
    Sale,
    Transfer,
    Adjustment,
    Return,
    Damage,
    WriteOff,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Sale => "sale",
            TransactionType::Transfer => "transfer",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Return => "return",
            TransactionType::Damage => "damage",
            TransactionType::WriteOff => "write-off",
        }
    }

    /// Movement log type for a change of the given sign
    pub fn movement_type(&self, delta: i64) -> MovementType {
        match self {
            TransactionType::Purchase => MovementType::Received,
            TransactionType::Sale => MovementType::Sale,
            TransactionType::Transfer if delta < 0 => MovementType::TransferOut,
            TransactionType::Transfer => MovementType::TransferIn,
            TransactionType::Adjustment => MovementType::Adjustment,
            TransactionType::Return => MovementType::Return,
            TransactionType::Damage => MovementType::Damage,
            TransactionType::WriteOff => MovementType::WriteOff,
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "sale" => Ok(TransactionType::Sale),
            "transfer" => Ok(TransactionType::Transfer),
            "adjustment" => Ok(TransactionType::Adjustment),
            "return" => Ok(TransactionType::Return),
            "damage" => Ok(TransactionType::Damage),
            "write-off" => Ok(TransactionType::WriteOff),
            other => Err(crate::ParseEnumError::new("transaction type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Cancelled,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Reversed => "reversed",
        }
    }

    /// Allowed status moves; entries themselves are never deleted
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Cancelled)
                | (TransactionStatus::Pending, TransactionStatus::Reversed)
                | (TransactionStatus::Completed, TransactionStatus::Reversed)
        )
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            "reversed" => Ok(TransactionStatus::Reversed),
            other => Err(crate::ParseEnumError::new("transaction status", other)),
        }
    }
}

/// Filter for history queries; unset fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, entry: &TransactionLogEntry) -> bool {
        self.product_id.map_or(true, |p| entry.product_id == p)
            && self.location_id.map_or(true, |l| entry.location_id == l)
            && self.transaction_type.map_or(true, |t| entry.transaction_type == t)
            && self.since.map_or(true, |s| entry.created_at >= s)
            && self.until.map_or(true, |u| entry.created_at <= u)
    }
}
