//! Sales transaction orchestrator: create, cancel, and payment confirmation.
//!
//! A sale runs as one transaction: allocate the invoice number, plan and
//! apply batch deductions per line, persist the order graph, then append the
//! ledger entry. Any failure rolls back everything, including the allocated
//! number. Orders carrying a manufactured line start in `pending_approval`
//! and defer their invoice ledger entry to the approval transition; all other
//! invoices write it here, fatally on error.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::allocation::{apply_deductions, fetch_product, plan_line, LinePlan};
use crate::services::ledger::{append_entry, reverse_reference, NewEntry};
use crate::services::sequence::{next_sequence, set_lock_timeout, SequenceScope};
use shared::allocation::AssignmentRequest;
use shared::ledger::covers_invoice;
use shared::models::{
    ItemAssignment, LedgerEntryType, OrderType, PaymentStatus, ProductionStatus, SalesItem,
    SalesOrder,
};
use shared::types::{round_money, round_quantity, Pagination};
use shared::validation;

#[derive(Debug, serde::Deserialize)]
pub struct CreateSaleInput {
    pub customer_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub order_type: OrderType,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
    pub items: Vec<CreateSaleItem>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateSaleItem {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub item_assignments: Option<Vec<AssignmentRequest>>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ConfirmPaymentInput {
    pub amount: Decimal,
    pub notes: Option<String>,
}

/// The persisted order graph returned to the caller
#[derive(Debug, serde::Serialize)]
pub struct SaleDetail {
    #[serde(flatten)]
    pub order: SalesOrder,
    pub items: Vec<SaleItemDetail>,
}

#[derive(Debug, serde::Serialize)]
pub struct SaleItemDetail {
    #[serde(flatten)]
    pub item: SalesItem,
    pub assignments: Vec<ItemAssignment>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SaleListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub branch_id: Option<Uuid>,
    pub production_status: Option<ProductionStatus>,
}

#[derive(Clone)]
pub struct SalesService {
    db: PgPool,
    lock_timeout_ms: u32,
}

impl SalesService {
    pub fn new(db: PgPool, lock_timeout_ms: u32) -> Self {
        Self {
            db,
            lock_timeout_ms,
        }
    }

    pub async fn create_sale(&self, input: CreateSaleInput) -> AppResult<SaleDetail> {
        validation::validate_has_items(&input.items)
            .map_err(|m| AppError::ValidationError(m.to_string()))?;
        for item in &input.items {
            validation::validate_quantity(item.quantity).map_err(|m| AppError::Validation {
                field: "quantity".to_string(),
                message: m.to_string(),
            })?;
            validation::validate_unit_price(item.unit_price).map_err(|m| {
                AppError::Validation {
                    field: "unit_price".to_string(),
                    message: m.to_string(),
                }
            })?;
        }
        let requested_payment = input.payment_status.unwrap_or(PaymentStatus::Unpaid);
        if requested_payment == PaymentStatus::Partial {
            return Err(AppError::ValidationError(
                "partial payment cannot be set at creation; confirm a payment instead".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let today = Utc::now().date_naive();
        let invoice_number = next_sequence(&mut tx, &SequenceScope::Invoice, today).await?;

        // Plan every line before persisting anything; planning locks the
        // batches it will deduct from.
        let mut plans: Vec<(&CreateSaleItem, LinePlan, Decimal)> =
            Vec::with_capacity(input.items.len());
        let mut total = Decimal::ZERO;
        for item in &input.items {
            let product = fetch_product(&mut tx, item.product_id).await?;
            let plan = plan_line(
                &mut tx,
                &product,
                input.branch_id,
                item.quantity,
                item.item_assignments.as_deref(),
            )
            .await?;
            let subtotal = round_money(item.quantity * item.unit_price);
            total += subtotal;
            plans.push((item, plan, subtotal));
        }

        let production_status = if plans
            .iter()
            .any(|(_, plan, _)| matches!(plan, LinePlan::Manufactured { .. }))
        {
            ProductionStatus::PendingApproval
        } else {
            ProductionStatus::Na
        };

        let paid_amount = match requested_payment {
            PaymentStatus::Paid => total,
            _ => Decimal::ZERO,
        };

        let order_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO sales_orders
                (invoice_number, branch_id, customer_id, order_type,
                 payment_status, production_status, total_amount, paid_amount, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&invoice_number)
        .bind(input.branch_id)
        .bind(input.customer_id)
        .bind(input.order_type.as_str())
        .bind(requested_payment.as_str())
        .bind(production_status.as_str())
        .bind(total)
        .bind(paid_amount)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        for (item, plan, subtotal) in &plans {
            let item_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO sales_items (order_id, product_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(round_quantity(item.quantity))
            .bind(round_money(item.unit_price))
            .bind(subtotal)
            .fetch_one(&mut *tx)
            .await?;

            apply_deductions(&mut tx, plan.deductions()).await?;
            for deduction in plan.deductions() {
                sqlx::query(
                    r#"
                    INSERT INTO item_assignments (item_id, batch_id, quantity_deducted)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(item_id)
                .bind(deduction.batch_id)
                .bind(deduction.quantity)
                .execute(&mut *tx)
                .await?;
            }
        }

        let mut final_payment = requested_payment;

        // Invoice ledger entry, unless deferred to manufacturing approval.
        // A failure here aborts the whole sale.
        if input.order_type == OrderType::Invoice
            && production_status != ProductionStatus::PendingApproval
            && total > Decimal::ZERO
        {
            if let Some(customer_id) = input.customer_id {
                let outcome = append_entry(
                    &mut tx,
                    &NewEntry {
                        contact_id: customer_id,
                        branch_id: input.branch_id,
                        transaction_date: today,
                        transaction_type: LedgerEntryType::Invoice,
                        debit_amount: total,
                        credit_amount: Decimal::ZERO,
                        reference_type: Some("sales_order".to_string()),
                        reference_id: Some(order_id),
                        notes: Some(format!("Invoice {invoice_number}")),
                    },
                )
                .await?;

                if requested_payment == PaymentStatus::Paid {
                    // Cash settled at the counter: record the matching payment
                    append_entry(
                        &mut tx,
                        &NewEntry {
                            contact_id: customer_id,
                            branch_id: input.branch_id,
                            transaction_date: today,
                            transaction_type: LedgerEntryType::Payment,
                            debit_amount: Decimal::ZERO,
                            credit_amount: total,
                            reference_type: Some("sales_order".to_string()),
                            reference_id: Some(order_id),
                            notes: Some(format!("Payment for {invoice_number}")),
                        },
                    )
                    .await?;
                } else if covers_invoice(outcome.prior_balance, total) {
                    // Existing credit absorbs the invoice; no payment event
                    final_payment = PaymentStatus::Paid;
                    sqlx::query(
                        "UPDATE sales_orders SET payment_status = $2, paid_amount = total_amount
                         WHERE id = $1",
                    )
                    .bind(order_id)
                    .bind(final_payment.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            invoice = %invoice_number,
            %total,
            payment = final_payment.as_str(),
            "sale created"
        );

        self.get_sale(order_id).await
    }

    /// Void a sale: restore every batch deduction, reverse the ledger, and
    /// delete the order graph. Rejected once production has started shipping
    /// physical goods.
    pub async fn cancel_sale(&self, order_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT invoice_number, production_status FROM sales_orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sales order {order_id}")))?;

        let status = ProductionStatus::parse(&row.1)
            .ok_or_else(|| AppError::Internal(format!("unknown production status '{}'", row.1)))?;
        if matches!(
            status,
            ProductionStatus::Produced | ProductionStatus::Delivered
        ) {
            return Err(AppError::Conflict {
                resource: "sales_order".to_string(),
                message: format!(
                    "order {} is already {}; it can no longer be cancelled",
                    row.0,
                    status.as_str()
                ),
            });
        }

        restore_order_assignments(&mut tx, order_id).await?;

        sqlx::query(
            "DELETE FROM item_assignments
             WHERE item_id IN (SELECT id FROM sales_items WHERE order_id = $1)",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM sales_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        reverse_reference(&mut tx, "sales_order", order_id).await?;

        sqlx::query("DELETE FROM sales_orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(invoice = %row.0, "sale cancelled");
        Ok(())
    }

    /// Record a payment against an order and move its payment status
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        input: ConfirmPaymentInput,
    ) -> AppResult<SaleDetail> {
        let amount = round_money(input.amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation {
                field: "amount".to_string(),
                message: "payment amount must be positive".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let row = sqlx::query_as::<_, (String, Uuid, Option<Uuid>, Decimal, Decimal)>(
            r#"
            SELECT invoice_number, branch_id, customer_id, total_amount, paid_amount
            FROM sales_orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sales order {order_id}")))?;
        let (invoice_number, branch_id, customer_id, total, paid) = row;

        let new_paid = paid + amount;
        if new_paid > total {
            return Err(AppError::ValidationError(format!(
                "payment of {amount} exceeds the outstanding amount on {invoice_number}"
            )));
        }
        let payment_status = PaymentStatus::from_amounts(new_paid, total);

        sqlx::query(
            "UPDATE sales_orders
             SET paid_amount = $2, payment_status = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(new_paid)
        .bind(payment_status.as_str())
        .execute(&mut *tx)
        .await?;

        if let Some(customer_id) = customer_id {
            append_entry(
                &mut tx,
                &NewEntry {
                    contact_id: customer_id,
                    branch_id,
                    transaction_date: Utc::now().date_naive(),
                    transaction_type: LedgerEntryType::Payment,
                    debit_amount: Decimal::ZERO,
                    credit_amount: amount,
                    reference_type: Some("sales_order".to_string()),
                    reference_id: Some(order_id),
                    notes: input.notes,
                },
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(invoice = %invoice_number, %amount, "payment confirmed");
        self.get_sale(order_id).await
    }

    pub async fn get_sale(&self, order_id: Uuid) -> AppResult<SaleDetail> {
        let order = fetch_order(&self.db, order_id).await?;

        let item_rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, Decimal, Decimal, Decimal)>(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price, subtotal
            FROM sales_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let mut items = Vec::with_capacity(item_rows.len());
        for r in item_rows {
            let assignments = sqlx::query_as::<
                _,
                (Uuid, Uuid, Uuid, Decimal, chrono::DateTime<Utc>),
            >(
                r#"
                SELECT id, item_id, batch_id, quantity_deducted, created_at
                FROM item_assignments
                WHERE item_id = $1
                ORDER BY created_at, id
                "#,
            )
            .bind(r.0)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(|a| ItemAssignment {
                id: a.0,
                item_id: a.1,
                batch_id: a.2,
                quantity_deducted: a.3,
                created_at: a.4,
            })
            .collect();

            items.push(SaleItemDetail {
                item: SalesItem {
                    id: r.0,
                    order_id: r.1,
                    product_id: r.2,
                    quantity: r.3,
                    unit_price: r.4,
                    subtotal: r.5,
                },
                assignments,
            });
        }

        Ok(SaleDetail { order, items })
    }

    pub async fn list_sales(&self, query: SaleListQuery) -> AppResult<Vec<SalesOrder>> {
        let pagination = Pagination::from_params(query.page, query.per_page);
        let rows = sqlx::query_as::<_, SalesOrderRow>(
            r#"
            SELECT id, invoice_number, branch_id, customer_id, order_type,
                   payment_status, production_status, total_amount, paid_amount,
                   produced_by, dispatched_by, vehicle_plate, delivery_signature,
                   notes, created_at, updated_at
            FROM sales_orders
            WHERE ($1::uuid IS NULL OR branch_id = $1)
              AND ($2::varchar IS NULL OR production_status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.branch_id)
        .bind(query.production_status.map(|s| s.as_str().to_string()))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(SalesOrderRow::into_model).collect()
    }
}

/// Restore every batch deduction of an order, oldest assignment first.
/// Scrapped batches are skipped with a warning; their quantity stays lost.
async fn restore_order_assignments(conn: &mut PgConnection, order_id: Uuid) -> AppResult<()> {
    let assignments = sqlx::query_as::<_, (Uuid, Decimal)>(
        r#"
        SELECT a.batch_id, a.quantity_deducted
        FROM item_assignments a
        JOIN sales_items i ON i.id = a.item_id
        WHERE i.order_id = $1
        ORDER BY a.created_at, a.id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    for (batch_id, quantity) in assignments {
        let restored =
            crate::services::allocation::restore_deduction(&mut *conn, batch_id, quantity).await?;
        if !restored {
            tracing::warn!(%batch_id, %quantity, "skipping restore to scrapped batch");
        }
    }
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SalesOrderRow {
    id: Uuid,
    invoice_number: String,
    branch_id: Uuid,
    customer_id: Option<Uuid>,
    order_type: String,
    payment_status: String,
    production_status: String,
    total_amount: Decimal,
    paid_amount: Decimal,
    produced_by: Option<String>,
    dispatched_by: Option<String>,
    vehicle_plate: Option<String>,
    delivery_signature: Option<String>,
    notes: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl SalesOrderRow {
    pub(crate) fn into_model(self) -> AppResult<SalesOrder> {
        let order_type = OrderType::parse(&self.order_type)
            .ok_or_else(|| AppError::Internal(format!("unknown order type '{}'", self.order_type)))?;
        let payment_status = PaymentStatus::parse(&self.payment_status).ok_or_else(|| {
            AppError::Internal(format!("unknown payment status '{}'", self.payment_status))
        })?;
        let production_status = ProductionStatus::parse(&self.production_status).ok_or_else(|| {
            AppError::Internal(format!(
                "unknown production status '{}'",
                self.production_status
            ))
        })?;
        Ok(SalesOrder {
            id: self.id,
            invoice_number: self.invoice_number,
            branch_id: self.branch_id,
            customer_id: self.customer_id,
            order_type,
            payment_status,
            production_status,
            total_amount: self.total_amount,
            paid_amount: self.paid_amount,
            produced_by: self.produced_by,
            dispatched_by: self.dispatched_by,
            vehicle_plate: self.vehicle_plate,
            delivery_signature: self.delivery_signature,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) async fn fetch_order(db: &PgPool, order_id: Uuid) -> AppResult<SalesOrder> {
    sqlx::query_as::<_, SalesOrderRow>(
        r#"
        SELECT id, invoice_number, branch_id, customer_id, order_type,
               payment_status, production_status, total_amount, paid_amount,
               produced_by, dispatched_by, vehicle_plate, delivery_signature,
               notes, created_at, updated_at
        FROM sales_orders
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Sales order {order_id}")))?
    .into_model()
}
