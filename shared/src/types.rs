//! Common types and numeric conventions used across the platform

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places carried by physical quantities (kg, pieces).
pub const QUANTITY_SCALE: u32 = 3;

/// Decimal places carried by monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Round a physical quantity to the platform quantity scale.
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp(QUANTITY_SCALE)
}

/// Round a monetary amount to the platform money scale.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(MONEY_SCALE)
}

/// Pagination parameters for list endpoints
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    /// Build from optional query parameters, clamping `per_page` to 200
    pub fn from_params(page: Option<u32>, per_page: Option<u32>) -> Self {
        let default = Self::default();
        Self {
            page: page.unwrap_or(default.page).max(1),
            per_page: per_page.unwrap_or(default.per_page).clamp(1, 200),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// Date range for statement and report queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}
