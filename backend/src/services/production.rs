//! Production workflow transitions for sales orders.
//!
//! The state machine itself is pure (`shared::models::ProductionStatus`);
//! this service applies a transition under the order row lock together with
//! its side effects. Approving a manufacturing order out of
//! `pending_approval` writes the deferred invoice ledger entry; that write is
//! wrapped in a savepoint and logged on failure rather than blocking the
//! approval, unlike the fatal ledger write at invoice creation.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{append_entry, NewEntry};
use crate::services::sequence::set_lock_timeout;
use shared::ledger::covers_invoice;
use shared::models::{LedgerEntryType, PaymentStatus, ProductionStatus, TransitionOutcome};
use shared::validation;

/// Requested transition plus the identities it records
#[derive(Debug, serde::Deserialize)]
pub struct TransitionInput {
    pub production_status: ProductionStatus,
    pub produced_by: Option<String>,
    pub dispatched_by: Option<String>,
    pub vehicle_plate: Option<String>,
    pub delivery_signature: Option<String>,
}

/// Result of a transition request
#[derive(Debug, serde::Serialize)]
pub struct TransitionResult {
    pub order_id: Uuid,
    pub production_status: ProductionStatus,
    pub payment_status: PaymentStatus,
    /// True when the request matched the current state and nothing changed
    pub no_op: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    branch_id: Uuid,
    customer_id: Option<Uuid>,
    invoice_number: String,
    production_status: String,
    payment_status: String,
    total_amount: Decimal,
    paid_amount: Decimal,
}

#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
    lock_timeout_ms: u32,
}

impl ProductionService {
    pub fn new(db: PgPool, lock_timeout_ms: u32) -> Self {
        Self {
            db,
            lock_timeout_ms,
        }
    }

    /// Move an order through the production workflow. Same-state requests
    /// succeed without touching the row.
    pub async fn transition(
        &self,
        order_id: Uuid,
        input: TransitionInput,
    ) -> AppResult<TransitionResult> {
        let to = input.production_status;
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let order = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, branch_id, customer_id, invoice_number,
                   production_status, payment_status, total_amount, paid_amount
            FROM sales_orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sales order {order_id}")))?;

        let from = ProductionStatus::parse(&order.production_status).ok_or_else(|| {
            AppError::Internal(format!(
                "unknown production status '{}'",
                order.production_status
            ))
        })?;
        let mut payment_status = PaymentStatus::parse(&order.payment_status).ok_or_else(|| {
            AppError::Internal(format!("unknown payment status '{}'", order.payment_status))
        })?;

        if let TransitionOutcome::NoOp = from.validate_transition(to)? {
            tx.commit().await?;
            return Ok(TransitionResult {
                order_id,
                production_status: from,
                payment_status,
                no_op: true,
            });
        }

        // Identities are only demanded when the state actually moves; a
        // same-state retry above succeeds without them
        match to {
            ProductionStatus::Produced => {
                let worker = input.produced_by.as_deref().unwrap_or("");
                validation::validate_identity(worker).map_err(|m| AppError::Validation {
                    field: "produced_by".to_string(),
                    message: m.to_string(),
                })?;
            }
            ProductionStatus::Delivered => {
                let dispatcher = input.dispatched_by.as_deref().unwrap_or("");
                validation::validate_identity(dispatcher).map_err(|m| AppError::Validation {
                    field: "dispatched_by".to_string(),
                    message: m.to_string(),
                })?;
            }
            _ => {}
        }

        // Approval of a manufacturing order writes the invoice entry that was
        // deferred at creation. A failure here is logged, not fatal.
        if from == ProductionStatus::PendingApproval && to == ProductionStatus::Queue {
            if let Some(paid) =
                self.approval_ledger_guarded(&mut tx, &order, payment_status).await?
            {
                if paid {
                    payment_status = PaymentStatus::Paid;
                }
            }
        }

        match to {
            ProductionStatus::Produced => {
                sqlx::query(
                    r#"
                    UPDATE sales_orders
                    SET production_status = $2, produced_by = $3,
                        payment_status = $4, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(order_id)
                .bind(to.as_str())
                .bind(&input.produced_by)
                .bind(payment_status.as_str())
                .execute(&mut *tx)
                .await?;
            }
            ProductionStatus::Delivered => {
                sqlx::query(
                    r#"
                    UPDATE sales_orders
                    SET production_status = $2, dispatched_by = $3,
                        vehicle_plate = $4, delivery_signature = $5,
                        payment_status = $6, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(order_id)
                .bind(to.as_str())
                .bind(&input.dispatched_by)
                .bind(&input.vehicle_plate)
                .bind(&input.delivery_signature)
                .bind(payment_status.as_str())
                .execute(&mut *tx)
                .await?;
            }
            _ => {
                sqlx::query(
                    r#"
                    UPDATE sales_orders
                    SET production_status = $2, payment_status = $3, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(order_id)
                .bind(to.as_str())
                .bind(payment_status.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            order = %order.invoice_number,
            from = from.as_str(),
            to = to.as_str(),
            "production status changed"
        );

        Ok(TransitionResult {
            order_id,
            production_status: to,
            payment_status,
            no_op: false,
        })
    }

    /// Savepoint wrapper around the approval ledger write. Returns
    /// `Some(auto_paid)` on success, `None` when the write failed and was
    /// rolled back to the savepoint.
    async fn approval_ledger_guarded(
        &self,
        conn: &mut PgConnection,
        order: &OrderRow,
        payment_status: PaymentStatus,
    ) -> AppResult<Option<bool>> {
        sqlx::query("SAVEPOINT approval_ledger")
            .execute(&mut *conn)
            .await?;

        match approval_ledger(conn, order, payment_status).await {
            Ok(paid) => {
                sqlx::query("RELEASE SAVEPOINT approval_ledger")
                    .execute(conn)
                    .await?;
                Ok(Some(paid))
            }
            Err(err) => {
                tracing::warn!(
                    order = %order.invoice_number,
                    error = %err,
                    "ledger write failed during approval; approving without entry"
                );
                sqlx::query("ROLLBACK TO SAVEPOINT approval_ledger")
                    .execute(conn)
                    .await?;
                Ok(None)
            }
        }
    }
}

/// Append the deferred invoice entry for an approved manufacturing order,
/// credit whatever the customer has already settled on it, and decide
/// auto-payment from the balance the contact held before the invoice.
async fn approval_ledger(
    conn: &mut PgConnection,
    order: &OrderRow,
    payment_status: PaymentStatus,
) -> AppResult<bool> {
    let customer_id = match order.customer_id {
        Some(id) => id,
        None => return Ok(false),
    };
    if order.total_amount <= Decimal::ZERO {
        return Ok(false);
    }

    // Idempotent against a retried approval that already wrote the entry
    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM ledger_entries
        WHERE reference_type = 'sales_order' AND reference_id = $1
          AND transaction_type = 'invoice'
        LIMIT 1
        "#,
    )
    .bind(order.id)
    .fetch_optional(&mut *conn)
    .await?;
    if existing.is_some() {
        return Ok(false);
    }

    let outcome = append_entry(
        conn,
        &NewEntry {
            contact_id: customer_id,
            branch_id: order.branch_id,
            transaction_date: Utc::now().date_naive(),
            transaction_type: LedgerEntryType::Invoice,
            debit_amount: order.total_amount,
            credit_amount: Decimal::ZERO,
            reference_type: Some("sales_order".to_string()),
            reference_id: Some(order.id),
            notes: Some(format!("Invoice {}", order.invoice_number)),
        },
    )
    .await?;

    // Payments confirmed while the order sat in approval already hold their
    // credit entries; an order created paid has none yet. Credit the
    // difference so the settled amount is fully represented.
    if order.paid_amount > Decimal::ZERO {
        let credited: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(credit_amount), 0) FROM ledger_entries
            WHERE reference_type = 'sales_order' AND reference_id = $1
              AND transaction_type = 'payment'
            "#,
        )
        .bind(order.id)
        .fetch_one(&mut *conn)
        .await?;

        let uncredited = order.paid_amount - credited;
        if uncredited > Decimal::ZERO {
            append_entry(
                conn,
                &NewEntry {
                    contact_id: customer_id,
                    branch_id: order.branch_id,
                    transaction_date: Utc::now().date_naive(),
                    transaction_type: LedgerEntryType::Payment,
                    debit_amount: Decimal::ZERO,
                    credit_amount: uncredited,
                    reference_type: Some("sales_order".to_string()),
                    reference_id: Some(order.id),
                    notes: Some(format!("Payment for {}", order.invoice_number)),
                },
            )
            .await?;
        }
    }

    // Existing credit absorbs the invoice; mark paid without a payment event
    if payment_status == PaymentStatus::Unpaid
        && covers_invoice(outcome.prior_balance, order.total_amount)
    {
        sqlx::query("UPDATE sales_orders SET paid_amount = total_amount WHERE id = $1")
            .bind(order.id)
            .execute(conn)
            .await?;
        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dead_pool() -> PgPool {
        // Never connects; any query attempt surfaces a database error
        PgPool::connect_lazy("postgres://localhost:9/void").unwrap()
    }

    /// A retry of the current state may omit identities; the request must
    /// reach the order row (here: fail on the database) instead of being
    /// rejected up front for a missing `produced_by`
    #[tokio::test]
    async fn identity_validation_waits_for_the_state_read() {
        let service = ProductionService::new(dead_pool(), 100);
        let input = TransitionInput {
            production_status: ProductionStatus::Produced,
            produced_by: None,
            dispatched_by: None,
            vehicle_plate: None,
            delivery_signature: None,
        };

        let err = service.transition(Uuid::new_v4(), input).await.unwrap_err();
        assert!(!matches!(err, AppError::Validation { .. }));
    }
}
