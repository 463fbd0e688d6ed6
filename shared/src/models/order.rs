//! Sales order models and the production status state machine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Commercial type of a sales order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Invoice,
    Draft,
    Quotation,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Invoice => "invoice",
            OrderType::Draft => "draft",
            OrderType::Quotation => "quotation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(OrderType::Invoice),
            "draft" => Some(OrderType::Draft),
            "quotation" => Some(OrderType::Quotation),
            _ => None,
        }
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }

    /// Derive payment status from amounts paid against an order total
    pub fn from_amounts(paid: Decimal, total: Decimal) -> Self {
        if total <= Decimal::ZERO || paid >= total {
            PaymentStatus::Paid
        } else if paid > Decimal::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        }
    }
}

/// Production workflow state of a sales order.
///
/// ```text
/// na               -> queue | pending_approval
/// pending_approval -> queue | rejected
/// rejected         -> pending_approval
/// queue            -> produced
/// produced         -> delivered
/// delivered        -> (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Na,
    PendingApproval,
    Rejected,
    Queue,
    Produced,
    Delivered,
}

/// Result of validating a requested transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Same-state request; succeed without touching anything
    NoOp,
    /// Transition is allowed and must be applied
    Apply,
}

/// A disallowed production status transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot move production status from '{}' to '{}'; allowed: {}", .from.as_str(), .to.as_str(), format_allowed(.from))]
pub struct InvalidTransition {
    pub from: ProductionStatus,
    pub to: ProductionStatus,
}

fn format_allowed(from: &ProductionStatus) -> String {
    let allowed = from.allowed_next();
    if allowed.is_empty() {
        "none (terminal state)".to_string()
    } else {
        allowed
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ProductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStatus::Na => "na",
            ProductionStatus::PendingApproval => "pending_approval",
            ProductionStatus::Rejected => "rejected",
            ProductionStatus::Queue => "queue",
            ProductionStatus::Produced => "produced",
            ProductionStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "na" => Some(ProductionStatus::Na),
            "pending_approval" => Some(ProductionStatus::PendingApproval),
            "rejected" => Some(ProductionStatus::Rejected),
            "queue" => Some(ProductionStatus::Queue),
            "produced" => Some(ProductionStatus::Produced),
            "delivered" => Some(ProductionStatus::Delivered),
            _ => None,
        }
    }

    /// States reachable from this one (same-state no-ops excluded)
    pub fn allowed_next(&self) -> &'static [ProductionStatus] {
        match self {
            ProductionStatus::Na => &[ProductionStatus::Queue, ProductionStatus::PendingApproval],
            ProductionStatus::PendingApproval => {
                &[ProductionStatus::Queue, ProductionStatus::Rejected]
            }
            ProductionStatus::Rejected => &[ProductionStatus::PendingApproval],
            ProductionStatus::Queue => &[ProductionStatus::Produced],
            ProductionStatus::Produced => &[ProductionStatus::Delivered],
            ProductionStatus::Delivered => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Validate a requested transition. Same-state requests are idempotent
    /// no-op successes; anything not in the transition table is rejected with
    /// an error naming the allowed set.
    pub fn validate_transition(
        &self,
        to: ProductionStatus,
    ) -> Result<TransitionOutcome, InvalidTransition> {
        if *self == to {
            return Ok(TransitionOutcome::NoOp);
        }
        if self.allowed_next().contains(&to) {
            Ok(TransitionOutcome::Apply)
        } else {
            Err(InvalidTransition { from: *self, to })
        }
    }
}

/// A sales order header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: Uuid,
    pub invoice_number: String,
    pub branch_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub order_type: OrderType,
    pub payment_status: PaymentStatus,
    pub production_status: ProductionStatus,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub produced_by: Option<String>,
    pub dispatched_by: Option<String>,
    pub vehicle_plate: Option<String>,
    pub delivery_signature: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}
