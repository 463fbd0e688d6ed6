//! Input validation utilities for the Fabrication ERP Platform
//!
//! These run before any database access; a request that fails here never
//! opens a transaction.

use rust_decimal::Decimal;

use crate::types::{MONEY_SCALE, QUANTITY_SCALE};

/// Validate a physical quantity: positive and within quantity scale
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    if quantity.scale() > QUANTITY_SCALE {
        return Err("Quantity carries more than 3 decimal places");
    }
    Ok(())
}

/// Validate a unit price: non-negative and within money scale
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    if price.scale() > MONEY_SCALE {
        return Err("Unit price carries more than 2 decimal places");
    }
    Ok(())
}

/// Validate a worker/dispatcher identity string
pub fn validate_identity(identity: &str) -> Result<(), &'static str> {
    if identity.trim().is_empty() {
        return Err("Identity cannot be empty");
    }
    Ok(())
}

/// Validate that an order carries at least one line
pub fn validate_has_items<T>(items: &[T]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("At least one item is required");
    }
    Ok(())
}
