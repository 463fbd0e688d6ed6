//! Return models (sales and purchase returns, two-phase)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which direction a return flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Sales,
    Purchase,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::Sales => "sales",
            ReturnKind::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sales" => Some(ReturnKind::Sales),
            "purchase" => Some(ReturnKind::Purchase),
            _ => None,
        }
    }
}

/// Two-phase return lifecycle: create leaves it pending with no stock or
/// ledger effect; approval applies both and is irreversible; cancel is only
/// possible while pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Cancelled,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReturnStatus::Pending),
            "approved" => Some(ReturnStatus::Approved),
            "cancelled" => Some(ReturnStatus::Cancelled),
            _ => None,
        }
    }
}

/// A return header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOrder {
    pub id: Uuid,
    pub return_number: String,
    pub kind: ReturnKind,
    pub order_id: Uuid,
    pub branch_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub status: ReturnStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// One returned line, referencing the original order line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItem {
    pub id: Uuid,
    pub return_id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}
