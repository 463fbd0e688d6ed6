//! Purchase transaction orchestrator: intake of stock and its reversal.
//!
//! A purchase creates the order graph and, for tracked products, one
//! inventory batch per physical unit received. Batch instance codes are
//! either supplied by the caller (coil tags already printed) or allocated
//! from the per-product+branch+batch-type daily sequence. The supplier's
//! ledger is credited fatally, like invoice creation on the sales side.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::allocation::fetch_product;
use crate::services::ledger::{append_entry, reverse_reference, NewEntry};
use crate::services::sequence::{next_sequence, set_lock_timeout, SequenceScope};
use shared::models::{LedgerEntryType, ProductKind, PurchaseItem, PurchaseOrder};
use shared::types::{round_money, round_quantity, Pagination};
use shared::validation;

#[derive(Debug, serde::Deserialize)]
pub struct CreatePurchaseInput {
    pub supplier_id: Uuid,
    pub branch_id: Uuid,
    pub notes: Option<String>,
    pub items: Vec<CreatePurchaseItem>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreatePurchaseItem {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub batch_type_id: Option<Uuid>,
    /// Physical units received; required for tracked products. Quantities
    /// must sum to the line quantity exactly.
    pub batches: Option<Vec<IntakeBatchInput>>,
}

#[derive(Debug, serde::Deserialize)]
pub struct IntakeBatchInput {
    pub quantity: Decimal,
    /// Pre-printed tag; generated from the batch-type sequence when absent
    pub instance_code: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct PurchaseDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseItem>,
    /// Instance codes of the batches this purchase brought into stock
    pub batch_codes: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct PurchaseListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub branch_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
    lock_timeout_ms: u32,
}

impl PurchaseService {
    pub fn new(db: PgPool, lock_timeout_ms: u32) -> Self {
        Self {
            db,
            lock_timeout_ms,
        }
    }

    pub async fn create_purchase(&self, input: CreatePurchaseInput) -> AppResult<PurchaseDetail> {
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
            if let Some(batches) = &item.batches {
                let sum: Decimal = batches.iter().map(|b| round_quantity(b.quantity)).sum();
                if sum != round_quantity(item.quantity) {
                    return Err(AppError::AssignmentQuantityMismatch(format!(
                        "batch quantities sum to {sum} but the line quantity is {}",
                        round_quantity(item.quantity)
                    )));
                }
            }
        }

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let today = Utc::now().date_naive();
        let po_number = next_sequence(&mut tx, &SequenceScope::PurchaseOrder, today).await?;

        let total: Decimal = input
            .items
            .iter()
            .map(|i| round_money(i.quantity * i.unit_price))
            .sum();

        let order_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO purchase_orders (po_number, branch_id, supplier_id, total_amount, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&po_number)
        .bind(input.branch_id)
        .bind(input.supplier_id)
        .bind(total)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        let mut batch_codes = Vec::new();
        for item in &input.items {
            let product = fetch_product(&mut tx, item.product_id).await?;

            let item_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO purchase_items (purchase_id, product_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(round_quantity(item.quantity))
            .bind(round_money(item.unit_price))
            .bind(round_money(item.quantity * item.unit_price))
            .fetch_one(&mut *tx)
            .await?;

            if product.kind != ProductKind::Tracked {
                if item.batches.is_some() {
                    return Err(AppError::ValidationError(format!(
                        "product '{}' is not batch-tracked; batches are not allowed",
                        product.name
                    )));
                }
                continue;
            }

            let one_batch = vec![IntakeBatchInput {
                quantity: item.quantity,
                instance_code: None,
            }];
            let intake = item.batches.as_deref().unwrap_or(&one_batch);
            for batch in intake {
                let quantity = round_quantity(batch.quantity);
                validation::validate_quantity(quantity).map_err(|m| AppError::Validation {
                    field: "batches.quantity".to_string(),
                    message: m.to_string(),
                })?;

                let code = match &batch.instance_code {
                    Some(code) => code.clone(),
                    None => {
                        let type_code =
                            batch_type_code(&mut tx, item.batch_type_id, &product.name).await?;
                        next_sequence(
                            &mut tx,
                            &SequenceScope::Instance {
                                type_code,
                                product_id: item.product_id,
                                branch_id: input.branch_id,
                            },
                            today,
                        )
                        .await?
                    }
                };

                sqlx::query(
                    r#"
                    INSERT INTO inventory_batches
                        (product_id, branch_id, batch_type_id, instance_code,
                         initial_quantity, remaining_quantity, source_purchase_item_id)
                    VALUES ($1, $2, $3, $4, $5, $5, $6)
                    "#,
                )
                .bind(item.product_id)
                .bind(input.branch_id)
                .bind(item.batch_type_id)
                .bind(&code)
                .bind(quantity)
                .bind(item_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| instance_code_conflict(e, &code))?;

                batch_codes.push(code);
            }
        }

        // What we owe the supplier grows; failure aborts the intake
        if total > Decimal::ZERO {
            append_entry(
                &mut tx,
                &NewEntry {
                    contact_id: input.supplier_id,
                    branch_id: input.branch_id,
                    transaction_date: today,
                    transaction_type: LedgerEntryType::Purchase,
                    debit_amount: Decimal::ZERO,
                    credit_amount: total,
                    reference_type: Some("purchase_order".to_string()),
                    reference_id: Some(order_id),
                    notes: Some(format!("Purchase {po_number}")),
                },
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(po = %po_number, %total, batches = batch_codes.len(), "purchase created");
        self.get_purchase(order_id).await
    }

    /// Void a purchase. Refused once any intake batch has been consumed,
    /// scrapped, or moved; otherwise the batches are deleted, the supplier
    /// credit reversed, and the order graph removed.
    pub async fn cancel_purchase(&self, order_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let po_number: String = sqlx::query_scalar(
            "SELECT po_number FROM purchase_orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Purchase order {order_id}")))?;

        let batches = sqlx::query_as::<_, (Uuid, String, Decimal, Decimal, String)>(
            r#"
            SELECT b.id, b.instance_code, b.initial_quantity, b.remaining_quantity, b.status
            FROM inventory_batches b
            JOIN purchase_items i ON i.id = b.source_purchase_item_id
            WHERE i.purchase_id = $1
            ORDER BY b.created_at, b.id
            FOR UPDATE OF b
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for (_, code, initial, remaining, status) in &batches {
            if status == "scrapped" || remaining != initial {
                return Err(AppError::Conflict {
                    resource: "purchase_order".to_string(),
                    message: format!(
                        "batch {code} from {po_number} has been consumed or scrapped; \
                         the purchase can no longer be cancelled"
                    ),
                });
            }
        }

        for (batch_id, ..) in &batches {
            sqlx::query("DELETE FROM inventory_batches WHERE id = $1")
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;
        }

        reverse_reference(&mut tx, "purchase_order", order_id).await?;

        sqlx::query("DELETE FROM purchase_items WHERE purchase_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(po = %po_number, "purchase cancelled");
        Ok(())
    }

    pub async fn get_purchase(&self, order_id: Uuid) -> AppResult<PurchaseDetail> {
        let order = sqlx::query_as::<
            _,
            (
                Uuid,
                String,
                Uuid,
                Uuid,
                Decimal,
                Option<String>,
                chrono::DateTime<Utc>,
            ),
        >(
            r#"
            SELECT id, po_number, branch_id, supplier_id, total_amount, notes, created_at
            FROM purchase_orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Purchase order {order_id}")))?;

        let items = sqlx::query_as::<_, (Uuid, Uuid, Uuid, Decimal, Decimal, Decimal)>(
            r#"
            SELECT id, purchase_id, product_id, quantity, unit_price, subtotal
            FROM purchase_items
            WHERE purchase_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|r| PurchaseItem {
            id: r.0,
            purchase_id: r.1,
            product_id: r.2,
            quantity: r.3,
            unit_price: r.4,
            subtotal: r.5,
        })
        .collect();

        let batch_codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT b.instance_code
            FROM inventory_batches b
            JOIN purchase_items i ON i.id = b.source_purchase_item_id
            WHERE i.purchase_id = $1
            ORDER BY b.created_at, b.id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(PurchaseDetail {
            order: PurchaseOrder {
                id: order.0,
                po_number: order.1,
                branch_id: order.2,
                supplier_id: order.3,
                total_amount: order.4,
                notes: order.5,
                created_at: order.6,
            },
            items,
            batch_codes,
        })
    }

    pub async fn list_purchases(&self, query: PurchaseListQuery) -> AppResult<Vec<PurchaseOrder>> {
        let pagination = Pagination::from_params(query.page, query.per_page);
        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                String,
                Uuid,
                Uuid,
                Decimal,
                Option<String>,
                chrono::DateTime<Utc>,
            ),
        >(
            r#"
            SELECT id, po_number, branch_id, supplier_id, total_amount, notes, created_at
            FROM purchase_orders
            WHERE ($1::uuid IS NULL OR branch_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(query.branch_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PurchaseOrder {
                id: r.0,
                po_number: r.1,
                branch_id: r.2,
                supplier_id: r.3,
                total_amount: r.4,
                notes: r.5,
                created_at: r.6,
            })
            .collect())
    }
}

/// Resolve the code of a batch type used to build instance codes
async fn batch_type_code(
    conn: &mut PgConnection,
    batch_type_id: Option<Uuid>,
    product_name: &str,
) -> AppResult<String> {
    let batch_type_id = batch_type_id.ok_or_else(|| {
        AppError::ValidationError(format!(
            "batch_type_id is required to generate instance codes for '{product_name}'"
        ))
    })?;
    sqlx::query_scalar::<_, String>("SELECT code FROM batch_types WHERE id = $1")
        .bind(batch_type_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Batch type {batch_type_id}")))
}

/// Map a unique violation on the instance code to its dedicated error
pub(crate) fn instance_code_conflict(err: sqlx::Error, code: &str) -> AppError {
    match AppError::from(err) {
        AppError::UniqueViolation(constraint) if constraint.contains("instance_code") => {
            AppError::DuplicateInstanceCode(format!("instance code '{code}' already exists"))
        }
        other => other,
    }
}
