//! Ledger entry models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The economic event a ledger entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Invoice,
    Payment,
    Purchase,
    SalesReturn,
    PurchaseReturn,
    Adjustment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Invoice => "invoice",
            LedgerEntryType::Payment => "payment",
            LedgerEntryType::Purchase => "purchase",
            LedgerEntryType::SalesReturn => "sales_return",
            LedgerEntryType::PurchaseReturn => "purchase_return",
            LedgerEntryType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(LedgerEntryType::Invoice),
            "payment" => Some(LedgerEntryType::Payment),
            "purchase" => Some(LedgerEntryType::Purchase),
            "sales_return" => Some(LedgerEntryType::SalesReturn),
            "purchase_return" => Some(LedgerEntryType::PurchaseReturn),
            "adjustment" => Some(LedgerEntryType::Adjustment),
            _ => None,
        }
    }
}

/// One immutable signed record against a contact. Entries are append-only;
/// reversal is delete + recalculation, never an in-place update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub branch_id: Uuid,
    pub transaction_date: NaiveDate,
    pub transaction_type: LedgerEntryType,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
    /// Running balance after this entry, maintained by recalculation
    pub balance_after: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
