//! Validation utilities for inventory commands

use std::collections::HashSet;

use rust_decimal::Decimal;

// ============================================================================
// Identifiers
// ============================================================================

/// Validate location code format (2-20 chars of uppercase alphanumeric, `-` or `_`)
pub fn validate_location_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Location code must be at least 2 characters");
    }
    if code.len() > 20 {
        return Err("Location code must be at most 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("Location code must be uppercase alphanumeric, '-' or '_'");
    }
    Ok(())
}

/// `validator` adapter for [`validate_location_code`]
pub fn validate_location_code_field(code: &str) -> Result<(), validator::ValidationError> {
    validate_location_code(code).map_err(|msg| {
        let mut err = validator::ValidationError::new("location_code");
        err.message = Some(msg.into());
        err
    })
}

/// Validate a batch number (1-64 printable chars, no surrounding whitespace)
pub fn validate_batch_number(batch: &str) -> Result<(), &'static str> {
    if batch.is_empty() {
        return Err("Batch number cannot be empty");
    }
    if batch.len() > 64 {
        return Err("Batch number must be at most 64 characters");
    }
    if batch.trim() != batch {
        return Err("Batch number cannot start or end with whitespace");
    }
    if batch.chars().any(|c| c.is_control()) {
        return Err("Batch number contains control characters");
    }
    Ok(())
}

/// Validate a list of serial numbers: non-empty, well-formed, no repeats
pub fn validate_serial_numbers(serials: &[String]) -> Result<(), &'static str> {
    if serials.is_empty() {
        return Err("At least one serial number is required");
    }
    let mut seen = HashSet::with_capacity(serials.len());
    for serial in serials {
        if serial.trim().is_empty() {
            return Err("Serial numbers cannot be blank");
        }
        if serial.len() > 128 {
            return Err("Serial numbers must be at most 128 characters");
        }
        if !seen.insert(serial.as_str()) {
            return Err("Serial numbers must not repeat");
        }
    }
    Ok(())
}

// ============================================================================
// Quantities and money
// ============================================================================

/// Validate that a movement quantity is strictly positive
pub fn validate_positive_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a reorder threshold
pub fn validate_threshold(threshold: i64) -> Result<(), &'static str> {
    if threshold < 0 {
        return Err("Reorder threshold cannot be negative");
    }
    Ok(())
}

/// Validate a unit cost
pub fn validate_cost_price(cost: Decimal) -> Result<(), &'static str> {
    if cost < Decimal::ZERO {
        return Err("Cost price cannot be negative");
    }
    Ok(())
}
