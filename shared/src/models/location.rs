//! Stock location models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::{Address, GeoCoordinates};

/// A physical or virtual site that holds stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    /// Unique short code (e.g., "WH1")
    pub code: String,
    pub location_type: LocationType,
    pub address: Option<Address>,
    /// Maximum units the site can hold, if bounded
    pub capacity: Option<i64>,
    /// Sum of all inventory record quantities at this location
    pub current_usage: i64,
    pub manager: Option<String>,
    pub contact: Option<String>,
    pub operating_hours: Option<String>,
    pub coordinates: Option<GeoCoordinates>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Usage as a percentage of capacity, when capacity is known and positive
    pub fn usage_percentage(&self) -> Option<Decimal> {
        match self.capacity {
            Some(capacity) if capacity > 0 => {
                Some(Decimal::from(self.current_usage) * Decimal::ONE_HUNDRED / Decimal::from(capacity))
            }
            _ => None,
        }
    }
}

/// Kind of stock location
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Warehouse,
    Store,
    DistributionCenter,
    Factory,
    Office,
    Virtual,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Warehouse => "warehouse",
            LocationType::Store => "store",
            LocationType::DistributionCenter => "distribution_center",
            LocationType::Factory => "factory",
            LocationType::Office => "office",
            LocationType::Virtual => "virtual",
        }
    }
}

impl std::str::FromStr for LocationType {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warehouse" => Ok(LocationType::Warehouse),
            "store" => Ok(LocationType::Store),
            "distribution_center" => Ok(LocationType::DistributionCenter),
            "factory" => Ok(LocationType::Factory),
            "office" => Ok(LocationType::Office),
            "virtual" => Ok(LocationType::Virtual),
            other => Err(crate::ParseEnumError::new("location type", other)),
        }
    }
}

/// Input for registering a new location
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(custom = "crate::validation::validate_location_code_field")]
    pub code: String,
    pub location_type: LocationType,
    pub address: Option<Address>,
    #[validate(range(min = 0))]
    pub capacity: Option<i64>,
    pub manager: Option<String>,
    pub contact: Option<String>,
    pub operating_hours: Option<String>,
    pub coordinates: Option<GeoCoordinates>,
}

impl NewLocation {
    /// Minimal input with only the required fields filled in
    pub fn new(name: impl Into<String>, code: impl Into<String>, location_type: LocationType) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            location_type,
            address: None,
            capacity: None,
            manager: None,
            contact: None,
            operating_hours: None,
            coordinates: None,
        }
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Materialize into a location with zero usage
    pub fn into_location(self, now: DateTime<Utc>) -> Location {
        Location {
            id: Uuid::new_v4(),
            name: self.name,
            code: self.code,
            location_type: self.location_type,
            address: self.address,
            capacity: self.capacity,
            current_usage: 0,
            manager: self.manager,
            contact: self.contact,
            operating_hours: self.operating_hours,
            coordinates: self.coordinates,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
