//! Inventory batch models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a physical batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InStock,
    Depleted,
    /// Terminal: a scrapped batch never re-enters stock
    Scrapped,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::InStock => "in_stock",
            BatchStatus::Depleted => "depleted",
            BatchStatus::Scrapped => "scrapped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_stock" => Some(BatchStatus::InStock),
            "depleted" => Some(BatchStatus::Depleted),
            "scrapped" => Some(BatchStatus::Scrapped),
            _ => None,
        }
    }
}

/// A physically distinct tracked unit of stock (coil, pallet).
///
/// Invariant: `remaining_quantity >= 0`, and `status == Depleted` exactly when
/// `remaining_quantity == 0` (unless scrapped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryBatch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_type_id: Option<Uuid>,
    pub instance_code: String,
    pub initial_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

/// Links one sold/consumed line to one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAssignment {
    pub id: Uuid,
    pub item_id: Uuid,
    pub batch_id: Uuid,
    pub quantity_deducted: Decimal,
    pub created_at: DateTime<Utc>,
}
