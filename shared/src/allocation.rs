//! Pure allocation planning for the inventory engine.
//!
//! Everything here operates on in-memory snapshots of batches that the caller
//! has already locked and re-read. The persistence layer applies the returned
//! plans; nothing in this module mutates storage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::BatchStatus;
use crate::types::round_quantity;

/// A locked, re-read view of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSnapshot {
    pub id: Uuid,
    pub product_id: Uuid,
    pub remaining_quantity: Decimal,
    pub status: BatchStatus,
}

/// One planned deduction against one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDeduction {
    pub batch_id: Uuid,
    pub quantity: Decimal,
}

/// A caller-supplied explicit assignment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub batch_id: Uuid,
    pub quantity: Decimal,
}

/// Read-only FIFO suggestion, for previewing an allocation before commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoProposal {
    pub required_quantity: Decimal,
    pub suggestions: Vec<PlannedDeduction>,
    /// Quantity that could not be covered by in-stock batches, if any
    pub shortfall: Option<Decimal>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("insufficient stock: required {required}, available {available}")]
    InsufficientStock {
        required: Decimal,
        available: Decimal,
    },

    #[error("batch {batch_id} holds product {actual}, expected product {expected}")]
    ProductMismatch {
        batch_id: Uuid,
        expected: Uuid,
        actual: Uuid,
    },

    #[error("assigned quantities sum to {actual}, exactly {expected} is required")]
    QuantityMismatch { expected: Decimal, actual: Decimal },

    #[error("batch {batch_id} is {status} and cannot be allocated from", status = .status.as_str())]
    BatchUnavailable { batch_id: Uuid, status: BatchStatus },

    #[error("batch {batch_id} holds {available}, cannot deduct {requested}")]
    BatchShort {
        batch_id: Uuid,
        available: Decimal,
        requested: Decimal,
    },

    #[error("assignment quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("duplicate batch {0} in assignment list")]
    DuplicateBatch(Uuid),
}

/// Raw quantity consumed by selling `quantity` units of a manufactured
/// product: `quantity * conversion_factor`, at quantity scale.
pub fn required_raw_quantity(quantity: Decimal, conversion_factor: Decimal) -> Decimal {
    round_quantity(quantity * conversion_factor)
}

/// Plan an oldest-first deduction of `required` across `batches`.
///
/// `batches` must already be ordered by creation time and re-read under lock.
/// Fails if the summed available quantity is short; otherwise consumes whole
/// batches until the tail batch takes the remainder.
pub fn plan_fifo(
    batches: &[BatchSnapshot],
    required: Decimal,
) -> Result<Vec<PlannedDeduction>, AllocationError> {
    if required <= Decimal::ZERO {
        return Err(AllocationError::NonPositiveQuantity(required));
    }

    let available: Decimal = batches
        .iter()
        .filter(|b| b.status == BatchStatus::InStock)
        .map(|b| b.remaining_quantity)
        .sum();
    if available < required {
        return Err(AllocationError::InsufficientStock {
            required,
            available,
        });
    }

    let mut plan = Vec::new();
    let mut outstanding = required;
    for batch in batches {
        if batch.status != BatchStatus::InStock || batch.remaining_quantity <= Decimal::ZERO {
            continue;
        }
        let take = outstanding.min(batch.remaining_quantity);
        plan.push(PlannedDeduction {
            batch_id: batch.id,
            quantity: take,
        });
        outstanding -= take;
        if outstanding.is_zero() {
            break;
        }
    }

    debug_assert!(outstanding.is_zero());
    Ok(plan)
}

/// Validate caller-selected assignments against locked batch snapshots.
///
/// Every batch must hold `expected_product` and enough remaining quantity.
/// When `required_total` is given (manufactured products), the assignment sum
/// must equal it by exact decimal comparison; any mismatch aborts the whole
/// operation.
pub fn validate_manual(
    batches: &[BatchSnapshot],
    requests: &[AssignmentRequest],
    expected_product: Uuid,
    required_total: Option<Decimal>,
) -> Result<Vec<PlannedDeduction>, AllocationError> {
    let mut seen: Vec<Uuid> = Vec::with_capacity(requests.len());
    let mut plan = Vec::with_capacity(requests.len());
    let mut total = Decimal::ZERO;

    for request in requests {
        if request.quantity <= Decimal::ZERO {
            return Err(AllocationError::NonPositiveQuantity(request.quantity));
        }
        if seen.contains(&request.batch_id) {
            return Err(AllocationError::DuplicateBatch(request.batch_id));
        }
        seen.push(request.batch_id);

        let batch = batches
            .iter()
            .find(|b| b.id == request.batch_id)
            .ok_or(AllocationError::BatchUnavailable {
                batch_id: request.batch_id,
                status: BatchStatus::Depleted,
            })?;

        if batch.status != BatchStatus::InStock {
            return Err(AllocationError::BatchUnavailable {
                batch_id: batch.id,
                status: batch.status,
            });
        }
        if batch.product_id != expected_product {
            return Err(AllocationError::ProductMismatch {
                batch_id: batch.id,
                expected: expected_product,
                actual: batch.product_id,
            });
        }
        if batch.remaining_quantity < request.quantity {
            return Err(AllocationError::BatchShort {
                batch_id: batch.id,
                available: batch.remaining_quantity,
                requested: request.quantity,
            });
        }

        total += request.quantity;
        plan.push(PlannedDeduction {
            batch_id: request.batch_id,
            quantity: request.quantity,
        });
    }

    if let Some(expected) = required_total {
        // Exact decimal equality; no tolerance.
        if total != expected {
            return Err(AllocationError::QuantityMismatch {
                expected,
                actual: total,
            });
        }
    }

    Ok(plan)
}

/// Compute a FIFO suggestion without requiring the stock to suffice. Never
/// fails on shortage; reports it instead so callers can preview.
pub fn propose_fifo(batches: &[BatchSnapshot], required: Decimal) -> FifoProposal {
    let mut suggestions = Vec::new();
    let mut outstanding = required;

    for batch in batches {
        if outstanding <= Decimal::ZERO {
            break;
        }
        if batch.status != BatchStatus::InStock || batch.remaining_quantity <= Decimal::ZERO {
            continue;
        }
        let take = outstanding.min(batch.remaining_quantity);
        suggestions.push(PlannedDeduction {
            batch_id: batch.id,
            quantity: take,
        });
        outstanding -= take;
    }

    FifoProposal {
        required_quantity: required,
        suggestions,
        shortfall: (outstanding > Decimal::ZERO).then_some(outstanding),
    }
}

/// Split a restored quantity across the batches an order line was deducted
/// from, proportionally to each batch's share of the original deduction.
///
/// Quantities are rounded to quantity scale; the final batch absorbs the
/// rounding remainder so the planned restores always sum to exactly
/// `restore_total`. A full return (`restore_total == total deducted`) hands
/// every batch back exactly what it gave.
pub fn plan_proportional_restore(
    assignments: &[PlannedDeduction],
    restore_total: Decimal,
) -> Result<Vec<PlannedDeduction>, AllocationError> {
    if restore_total <= Decimal::ZERO {
        return Err(AllocationError::NonPositiveQuantity(restore_total));
    }
    let total_deducted: Decimal = assignments.iter().map(|a| a.quantity).sum();
    if restore_total > total_deducted {
        return Err(AllocationError::QuantityMismatch {
            expected: total_deducted,
            actual: restore_total,
        });
    }

    let mut plan = Vec::with_capacity(assignments.len());
    let mut remaining = restore_total;
    for (index, assignment) in assignments.iter().enumerate() {
        let share = if index + 1 == assignments.len() {
            remaining
        } else {
            round_quantity(restore_total * assignment.quantity / total_deducted).min(remaining)
        };
        if share > Decimal::ZERO {
            plan.push(PlannedDeduction {
                batch_id: assignment.batch_id,
                quantity: share,
            });
        }
        remaining -= share;
    }

    debug_assert!(remaining.is_zero());
    Ok(plan)
}

/// Apply a deduction to a snapshot: `remaining -= quantity`, flipping status
/// to depleted at exactly zero. Callers must have validated the quantity.
pub fn apply_deduction(batch: &mut BatchSnapshot, quantity: Decimal) {
    batch.remaining_quantity -= quantity;
    if batch.remaining_quantity <= Decimal::ZERO {
        batch.remaining_quantity = Decimal::ZERO;
        if batch.status == BatchStatus::InStock {
            batch.status = BatchStatus::Depleted;
        }
    }
}

/// Reverse a deduction: add the quantity back and flip depleted batches back
/// to in-stock. Scrapped batches keep their quantity but are never restored
/// to circulation.
pub fn restore_quantity(batch: &mut BatchSnapshot, quantity: Decimal) {
    batch.remaining_quantity += quantity;
    if batch.status == BatchStatus::Depleted && batch.remaining_quantity > Decimal::ZERO {
        batch.status = BatchStatus::InStock;
    }
}
