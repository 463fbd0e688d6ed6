//! Two-phase returns: a pending return carries no stock or ledger effect;
//! approval applies both at once and is irreversible.
//!
//! Sales-return approval restores stock proportionally across the batches the
//! original line drew from (via the line's recorded assignments). Purchase-
//! return approval deducts the returned quantity FIFO, exactly like a sale of
//! the raw product back to the supplier.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::allocation::{
    apply_deductions, fetch_product, line_stock_target, lock_fifo_batches, restore_deduction,
};
use crate::services::ledger::{append_entry, NewEntry};
use crate::services::sequence::{next_sequence, set_lock_timeout, SequenceScope};
use shared::allocation::{plan_fifo, plan_proportional_restore, required_raw_quantity, PlannedDeduction};
use shared::models::{
    LedgerEntryType, ProductKind, ReturnItem, ReturnKind, ReturnOrder, ReturnStatus,
};
use shared::types::{round_money, round_quantity, Pagination};
use shared::validation;

#[derive(Debug, serde::Deserialize)]
pub struct CreateReturnInput {
    pub kind: ReturnKind,
    pub order_id: Uuid,
    pub notes: Option<String>,
    pub items: Vec<CreateReturnItem>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateReturnItem {
    /// The original sales or purchase line being returned against
    pub order_item_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, serde::Serialize)]
pub struct ReturnDetail {
    #[serde(flatten)]
    pub order: ReturnOrder,
    pub items: Vec<ReturnItem>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ReturnListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub kind: Option<ReturnKind>,
    pub status: Option<ReturnStatus>,
}

#[derive(Clone)]
pub struct ReturnService {
    db: PgPool,
    lock_timeout_ms: u32,
}

impl ReturnService {
    pub fn new(db: PgPool, lock_timeout_ms: u32) -> Self {
        Self {
            db,
            lock_timeout_ms,
        }
    }

    /// Record a pending return. Validates every line against the original
    /// order, including quantity already claimed by earlier returns, but
    /// touches neither stock nor the ledger.
    pub async fn create_return(&self, input: CreateReturnInput) -> AppResult<ReturnDetail> {
        validation::validate_has_items(&input.items)
            .map_err(|m| AppError::ValidationError(m.to_string()))?;
        for item in &input.items {
            validation::validate_quantity(item.quantity).map_err(|m| AppError::Validation {
                field: "quantity".to_string(),
                message: m.to_string(),
            })?;
        }

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let (branch_id, contact_id, order_number) = match input.kind {
            ReturnKind::Sales => {
                let row = sqlx::query_as::<_, (Uuid, Option<Uuid>, String)>(
                    "SELECT branch_id, customer_id, invoice_number
                     FROM sales_orders WHERE id = $1 FOR UPDATE",
                )
                .bind(input.order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Sales order {}", input.order_id)))?;
                (row.0, row.1, row.2)
            }
            ReturnKind::Purchase => {
                let row = sqlx::query_as::<_, (Uuid, Uuid, String)>(
                    "SELECT branch_id, supplier_id, po_number
                     FROM purchase_orders WHERE id = $1 FOR UPDATE",
                )
                .bind(input.order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Purchase order {}", input.order_id)))?;
                (row.0, Some(row.1), row.2)
            }
        };

        let scope = match input.kind {
            ReturnKind::Sales => SequenceScope::SalesReturn,
            ReturnKind::Purchase => SequenceScope::PurchaseReturn,
        };
        let today = Utc::now().date_naive();
        let return_number = next_sequence(&mut tx, &scope, today).await?;

        // Validate each line against the original order and earlier returns
        let mut lines: Vec<(Uuid, Uuid, Decimal, Decimal, Decimal)> = Vec::new();
        let mut total = Decimal::ZERO;
        for item in &input.items {
            let quantity = round_quantity(item.quantity);
            let (product_id, sold_quantity, unit_price) =
                original_line(&mut tx, input.kind, input.order_id, item.order_item_id).await?;

            let already: Decimal = sqlx::query_scalar::<_, Option<Decimal>>(
                r#"
                SELECT SUM(ri.quantity)
                FROM return_items ri
                JOIN returns r ON r.id = ri.return_id
                WHERE ri.order_item_id = $1 AND r.status IN ('pending', 'approved')
                "#,
            )
            .bind(item.order_item_id)
            .fetch_one(&mut *tx)
            .await?
            .unwrap_or(Decimal::ZERO);

            if already + quantity > sold_quantity {
                return Err(AppError::ValidationError(format!(
                    "returning {quantity} would exceed the original line quantity \
                     {sold_quantity} on {order_number} ({already} already claimed)"
                )));
            }

            let subtotal = round_money(quantity * unit_price);
            total += subtotal;
            lines.push((item.order_item_id, product_id, quantity, unit_price, subtotal));
        }

        let return_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO returns
                (return_number, kind, order_id, branch_id, contact_id, total_amount, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&return_number)
        .bind(input.kind.as_str())
        .bind(input.order_id)
        .bind(branch_id)
        .bind(contact_id)
        .bind(total)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        for (order_item_id, product_id, quantity, unit_price, subtotal) in &lines {
            sqlx::query(
                r#"
                INSERT INTO return_items
                    (return_id, order_item_id, product_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(return_id)
            .bind(order_item_id)
            .bind(product_id)
            .bind(quantity)
            .bind(unit_price)
            .bind(subtotal)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(number = %return_number, kind = input.kind.as_str(), "return created");
        self.get_return(return_id).await
    }

    /// Apply a pending return: restore or deduct stock and write the ledger
    /// entry. Once approved, a return can never be undone.
    pub async fn approve_return(&self, return_id: Uuid) -> AppResult<ReturnDetail> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let header = sqlx::query_as::<_, (String, String, String, Uuid, Uuid, Option<Uuid>, Decimal)>(
            r#"
            SELECT return_number, kind, status, order_id, branch_id, contact_id, total_amount
            FROM returns
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(return_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Return {return_id}")))?;
        let (return_number, kind_raw, status_raw, order_id, branch_id, contact_id, total) = header;

        let kind = ReturnKind::parse(&kind_raw)
            .ok_or_else(|| AppError::Internal(format!("unknown return kind '{kind_raw}'")))?;
        let status = ReturnStatus::parse(&status_raw)
            .ok_or_else(|| AppError::Internal(format!("unknown return status '{status_raw}'")))?;
        if status != ReturnStatus::Pending {
            return Err(AppError::Conflict {
                resource: "return".to_string(),
                message: format!("return {return_number} is already {status_raw}"),
            });
        }

        let items = sqlx::query_as::<_, (Uuid, Uuid, Decimal)>(
            "SELECT order_item_id, product_id, quantity FROM return_items
             WHERE return_id = $1 ORDER BY id",
        )
        .bind(return_id)
        .fetch_all(&mut *tx)
        .await?;

        match kind {
            ReturnKind::Sales => {
                // Lock the original order header before touching its batches
                sqlx::query("SELECT id FROM sales_orders WHERE id = $1 FOR UPDATE")
                    .bind(order_id)
                    .execute(&mut *tx)
                    .await?;
                for (order_item_id, product_id, quantity) in &items {
                    restore_sold_line(&mut tx, *order_item_id, *product_id, *quantity).await?;
                }
            }
            ReturnKind::Purchase => {
                for (_, product_id, quantity) in &items {
                    deduct_returned_line(&mut tx, *product_id, branch_id, *quantity).await?;
                }
            }
        }

        if let Some(contact_id) = contact_id {
            if total > Decimal::ZERO {
                let (entry_type, debit, credit) = match kind {
                    // Customer gets credit back
                    ReturnKind::Sales => (LedgerEntryType::SalesReturn, Decimal::ZERO, total),
                    // We owe the supplier less
                    ReturnKind::Purchase => (LedgerEntryType::PurchaseReturn, total, Decimal::ZERO),
                };
                append_entry(
                    &mut tx,
                    &NewEntry {
                        contact_id,
                        branch_id,
                        transaction_date: Utc::now().date_naive(),
                        transaction_type: entry_type,
                        debit_amount: debit,
                        credit_amount: credit,
                        reference_type: Some("return".to_string()),
                        reference_id: Some(return_id),
                        notes: Some(format!("Return {return_number}")),
                    },
                )
                .await?;
            }
        }

        sqlx::query("UPDATE returns SET status = 'approved', approved_at = NOW() WHERE id = $1")
            .bind(return_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(number = %return_number, "return approved");
        self.get_return(return_id).await
    }

    /// Withdraw a pending return. Nothing was applied, so nothing is undone.
    pub async fn cancel_return(&self, return_id: Uuid) -> AppResult<ReturnDetail> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT return_number, status FROM returns WHERE id = $1 FOR UPDATE",
        )
        .bind(return_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Return {return_id}")))?;

        if row.1 != ReturnStatus::Pending.as_str() {
            return Err(AppError::Conflict {
                resource: "return".to_string(),
                message: format!("return {} is already {}; approval is irreversible", row.0, row.1),
            });
        }

        sqlx::query("UPDATE returns SET status = 'cancelled' WHERE id = $1")
            .bind(return_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(number = %row.0, "return cancelled");
        self.get_return(return_id).await
    }

    pub async fn get_return(&self, return_id: Uuid) -> AppResult<ReturnDetail> {
        let order = fetch_return(&self.db, return_id).await?;

        let items = sqlx::query_as::<_, (Uuid, Uuid, Uuid, Uuid, Decimal, Decimal, Decimal)>(
            r#"
            SELECT id, return_id, order_item_id, product_id, quantity, unit_price, subtotal
            FROM return_items
            WHERE return_id = $1
            ORDER BY id
            "#,
        )
        .bind(return_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|r| ReturnItem {
            id: r.0,
            return_id: r.1,
            order_item_id: r.2,
            product_id: r.3,
            quantity: r.4,
            unit_price: r.5,
            subtotal: r.6,
        })
        .collect();

        Ok(ReturnDetail { order, items })
    }

    pub async fn list_returns(&self, query: ReturnListQuery) -> AppResult<Vec<ReturnOrder>> {
        let pagination = Pagination::from_params(query.page, query.per_page);
        let rows = sqlx::query_as::<_, ReturnRow>(
            r#"
            SELECT id, return_number, kind, order_id, branch_id, contact_id,
                   status, total_amount, notes, created_at, approved_at
            FROM returns
            WHERE ($1::varchar IS NULL OR kind = $1)
              AND ($2::varchar IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.kind.map(|k| k.as_str().to_string()))
        .bind(query.status.map(|s| s.as_str().to_string()))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ReturnRow::into_model).collect()
    }
}

/// Fetch the original order line a return item references, checking it
/// belongs to the order being returned against
async fn original_line(
    conn: &mut PgConnection,
    kind: ReturnKind,
    order_id: Uuid,
    order_item_id: Uuid,
) -> AppResult<(Uuid, Decimal, Decimal)> {
    let query = match kind {
        ReturnKind::Sales => {
            "SELECT product_id, quantity, unit_price FROM sales_items
             WHERE id = $1 AND order_id = $2"
        }
        ReturnKind::Purchase => {
            "SELECT product_id, quantity, unit_price FROM purchase_items
             WHERE id = $1 AND purchase_id = $2"
        }
    };
    sqlx::query_as::<_, (Uuid, Decimal, Decimal)>(query)
        .bind(order_item_id)
        .bind(order_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Order line {order_item_id} on order {order_id}"))
        })
}

/// Deduct the stock a purchase-return line hands back to the supplier.
/// Standard products own no batches and are skipped; tracked and
/// manufactured lines deduct FIFO in stock units.
async fn deduct_returned_line(
    conn: &mut PgConnection,
    product_id: Uuid,
    branch_id: Uuid,
    returned_quantity: Decimal,
) -> AppResult<()> {
    let product = fetch_product(conn, product_id).await?;
    let Some((target_product, required)) = line_stock_target(&product, returned_quantity)? else {
        return Ok(());
    };

    let snapshots = lock_fifo_batches(conn, target_product, branch_id).await?;
    let plan = plan_fifo(&snapshots, required)?;
    apply_deductions(conn, &plan).await?;
    Ok(())
}

/// Restore the stock a sold line consumed, proportionally across the batches
/// its assignments drew from. Manufactured lines restore in raw units via the
/// recipe. Scrapped batches are skipped with a warning.
async fn restore_sold_line(
    conn: &mut PgConnection,
    order_item_id: Uuid,
    product_id: Uuid,
    returned_quantity: Decimal,
) -> AppResult<()> {
    let product = fetch_product(conn, product_id).await?;
    let restore_total = match product.kind {
        ProductKind::Standard => return Ok(()),
        ProductKind::Tracked => returned_quantity,
        ProductKind::Manufactured => {
            let recipe = product.recipe.as_ref().ok_or_else(|| {
                AppError::ValidationError(format!(
                    "manufactured product '{}' has no recipe",
                    product.name
                ))
            })?;
            required_raw_quantity(returned_quantity, recipe.conversion_factor)
        }
    };

    let assignments: Vec<PlannedDeduction> = sqlx::query_as::<_, (Uuid, Decimal)>(
        "SELECT batch_id, quantity_deducted FROM item_assignments
         WHERE item_id = $1 ORDER BY created_at, id",
    )
    .bind(order_item_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(batch_id, quantity)| PlannedDeduction { batch_id, quantity })
    .collect();

    if assignments.is_empty() {
        return Ok(());
    }

    let plan = plan_proportional_restore(&assignments, restore_total)?;
    for restore in &plan {
        let restored = restore_deduction(&mut *conn, restore.batch_id, restore.quantity).await?;
        if !restored {
            tracing::warn!(
                batch_id = %restore.batch_id,
                quantity = %restore.quantity,
                "skipping restore to scrapped batch"
            );
        }
    }
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct ReturnRow {
    id: Uuid,
    return_number: String,
    kind: String,
    order_id: Uuid,
    branch_id: Uuid,
    contact_id: Option<Uuid>,
    status: String,
    total_amount: Decimal,
    notes: Option<String>,
    created_at: chrono::DateTime<Utc>,
    approved_at: Option<chrono::DateTime<Utc>>,
}

impl ReturnRow {
    fn into_model(self) -> AppResult<ReturnOrder> {
        let kind = ReturnKind::parse(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("unknown return kind '{}'", self.kind)))?;
        let status = ReturnStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(format!("unknown return status '{}'", self.status)))?;
        Ok(ReturnOrder {
            id: self.id,
            return_number: self.return_number,
            kind,
            order_id: self.order_id,
            branch_id: self.branch_id,
            contact_id: self.contact_id,
            status,
            total_amount: self.total_amount,
            notes: self.notes,
            created_at: self.created_at,
            approved_at: self.approved_at,
        })
    }
}

async fn fetch_return(db: &PgPool, return_id: Uuid) -> AppResult<ReturnOrder> {
    sqlx::query_as::<_, ReturnRow>(
        r#"
        SELECT id, return_number, kind, order_id, branch_id, contact_id,
               status, total_amount, notes, created_at, approved_at
        FROM returns
        WHERE id = $1
        "#,
    )
    .bind(return_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Return {return_id}")))?
    .into_model()
}
