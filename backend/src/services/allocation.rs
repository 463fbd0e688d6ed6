//! Inventory allocation engine: decides which physical batches satisfy a
//! requested quantity and applies the resulting deductions.
//!
//! The pure planning rules live in `shared::allocation`; this module owns the
//! locking discipline around them. Batches are always locked first and
//! re-read under the lock before any quantity is trusted. Proposal mode is
//! the exception: it reads without locking and never mutates.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::allocation::{
    plan_fifo, propose_fifo, required_raw_quantity, validate_manual, AssignmentRequest,
    BatchSnapshot, FifoProposal, PlannedDeduction,
};
use shared::models::{BatchStatus, ProductKind};
use shared::types::round_quantity;

/// Product fields the engine needs for allocation decisions
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub id: Uuid,
    pub name: String,
    pub kind: ProductKind,
    pub recipe: Option<RecipeInfo>,
}

#[derive(Debug, Clone)]
pub struct RecipeInfo {
    pub raw_product_id: Uuid,
    pub conversion_factor: Decimal,
}

/// How one order line is satisfied, dispatched by product kind and the
/// presence of explicit assignments
#[derive(Debug, Clone)]
pub enum LinePlan {
    /// Non-tracked product; no batch mutation
    Standard,
    /// Tracked product sold from its own batches
    Tracked { deductions: Vec<PlannedDeduction> },
    /// Manufactured product consuming raw-material batches via its recipe
    Manufactured {
        raw_product_id: Uuid,
        required_raw: Decimal,
        deductions: Vec<PlannedDeduction>,
    },
}

impl LinePlan {
    pub fn deductions(&self) -> &[PlannedDeduction] {
        match self {
            LinePlan::Standard => &[],
            LinePlan::Tracked { deductions } => deductions,
            LinePlan::Manufactured { deductions, .. } => deductions,
        }
    }
}

/// Fetch the allocation-relevant view of a product (with its recipe, if any)
pub async fn fetch_product(conn: &mut PgConnection, product_id: Uuid) -> AppResult<ProductInfo> {
    let row = sqlx::query_as::<_, (Uuid, String, String, Option<Uuid>, Option<Decimal>)>(
        r#"
        SELECT p.id, p.name, p.kind, r.raw_product_id, r.conversion_factor
        FROM products p
        LEFT JOIN recipes r ON r.product_id = p.id
        WHERE p.id = $1
        "#,
    )
    .bind(product_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {product_id}")))?;

    let kind = ProductKind::parse(&row.2)
        .ok_or_else(|| AppError::Internal(format!("unknown product kind '{}'", row.2)))?;

    let recipe = match (row.3, row.4) {
        (Some(raw_product_id), Some(conversion_factor)) => Some(RecipeInfo {
            raw_product_id,
            conversion_factor,
        }),
        _ => None,
    };

    Ok(ProductInfo {
        id: row.0,
        name: row.1,
        kind,
        recipe,
    })
}

/// Which batches a line touches, per product kind: `None` for non-tracked
/// products, otherwise the product whose batches are deducted and the
/// quantity in stock units (raw units for manufactured lines).
pub fn line_stock_target(
    product: &ProductInfo,
    quantity: Decimal,
) -> AppResult<Option<(Uuid, Decimal)>> {
    match product.kind {
        ProductKind::Standard => Ok(None),
        ProductKind::Tracked => Ok(Some((product.id, round_quantity(quantity)))),
        ProductKind::Manufactured => {
            let recipe = product.recipe.as_ref().ok_or_else(|| {
                AppError::ValidationError(format!(
                    "manufactured product '{}' has no recipe",
                    product.name
                ))
            })?;
            Ok(Some((
                recipe.raw_product_id,
                required_raw_quantity(quantity, recipe.conversion_factor),
            )))
        }
    }
}

/// Plan one order line inside the caller's transaction, locking whatever
/// batches the plan touches. The caller applies the plan afterwards.
pub async fn plan_line(
    conn: &mut PgConnection,
    product: &ProductInfo,
    branch_id: Uuid,
    quantity: Decimal,
    manual: Option<&[AssignmentRequest]>,
) -> AppResult<LinePlan> {
    match product.kind {
        ProductKind::Standard => {
            if manual.is_some_and(|m| !m.is_empty()) {
                return Err(AppError::ValidationError(format!(
                    "product '{}' is not batch-tracked; item_assignments are not allowed",
                    product.name
                )));
            }
            Ok(LinePlan::Standard)
        }
        ProductKind::Tracked => {
            let required = round_quantity(quantity);
            let deductions =
                plan_deductions(conn, product.id, branch_id, required, manual).await?;
            Ok(LinePlan::Tracked { deductions })
        }
        ProductKind::Manufactured => {
            let recipe = product.recipe.as_ref().ok_or_else(|| {
                AppError::ValidationError(format!(
                    "manufactured product '{}' has no recipe",
                    product.name
                ))
            })?;
            let required_raw = required_raw_quantity(quantity, recipe.conversion_factor);
            let deductions =
                plan_deductions(conn, recipe.raw_product_id, branch_id, required_raw, manual)
                    .await?;
            Ok(LinePlan::Manufactured {
                raw_product_id: recipe.raw_product_id,
                required_raw,
                deductions,
            })
        }
    }
}

/// FIFO or manual deduction plan against `product_id` batches for exactly
/// `required` units
async fn plan_deductions(
    conn: &mut PgConnection,
    product_id: Uuid,
    branch_id: Uuid,
    required: Decimal,
    manual: Option<&[AssignmentRequest]>,
) -> AppResult<Vec<PlannedDeduction>> {
    match manual {
        Some(requests) if !requests.is_empty() => {
            let ids: Vec<Uuid> = requests.iter().map(|r| r.batch_id).collect();
            let snapshots = lock_batches(conn, &ids).await?;
            let plan = validate_manual(&snapshots, requests, product_id, Some(required))?;
            Ok(plan)
        }
        _ => {
            let snapshots = lock_fifo_batches(conn, product_id, branch_id).await?;
            let plan = plan_fifo(&snapshots, required)?;
            Ok(plan)
        }
    }
}

/// Lock all in-stock batches for a product+branch in creation order and
/// return their post-lock state
pub async fn lock_fifo_batches(
    conn: &mut PgConnection,
    product_id: Uuid,
    branch_id: Uuid,
) -> AppResult<Vec<BatchSnapshot>> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, Decimal, String)>(
        r#"
        SELECT id, product_id, remaining_quantity, status
        FROM inventory_batches
        WHERE product_id = $1 AND branch_id = $2 AND status = 'in_stock'
        ORDER BY created_at, id
        FOR UPDATE
        "#,
    )
    .bind(product_id)
    .bind(branch_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(snapshot_from_row).collect()
}

/// Lock specific batches one at a time, in the caller's processing order,
/// and return their post-lock state in the same order
pub async fn lock_batches(
    conn: &mut PgConnection,
    batch_ids: &[Uuid],
) -> AppResult<Vec<BatchSnapshot>> {
    let mut snapshots = Vec::with_capacity(batch_ids.len());
    for batch_id in batch_ids {
        let row = sqlx::query_as::<_, (Uuid, Uuid, Decimal, String)>(
            r#"
            SELECT id, product_id, remaining_quantity, status
            FROM inventory_batches
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Batch {batch_id}")))?;
        snapshots.push(snapshot_from_row(row)?);
    }
    Ok(snapshots)
}

fn snapshot_from_row(row: (Uuid, Uuid, Decimal, String)) -> AppResult<BatchSnapshot> {
    let status = BatchStatus::parse(&row.3)
        .ok_or_else(|| AppError::Internal(format!("unknown batch status '{}'", row.3)))?;
    Ok(BatchSnapshot {
        id: row.0,
        product_id: row.1,
        remaining_quantity: row.2,
        status,
    })
}

/// Apply a deduction plan: `remaining -= quantity`, flipping to depleted at
/// zero. The rows are already locked by the planning step.
pub async fn apply_deductions(
    conn: &mut PgConnection,
    plan: &[PlannedDeduction],
) -> AppResult<()> {
    for deduction in plan {
        sqlx::query(
            r#"
            UPDATE inventory_batches
            SET remaining_quantity = remaining_quantity - $2,
                status = CASE
                    WHEN remaining_quantity - $2 <= 0 THEN 'depleted'
                    ELSE status
                END
            WHERE id = $1
            "#,
        )
        .bind(deduction.batch_id)
        .bind(deduction.quantity)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Reverse one deduction: add the quantity back and flip depleted batches to
/// in-stock. Scrapped batches are left untouched (never auto-restored); the
/// skip is reported to the caller via the returned flag.
pub async fn restore_deduction(
    conn: &mut PgConnection,
    batch_id: Uuid,
    quantity: Decimal,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_batches
        SET remaining_quantity = remaining_quantity + $2,
            status = CASE
                WHEN status = 'depleted' AND remaining_quantity + $2 > 0 THEN 'in_stock'
                ELSE status
            END
        WHERE id = $1 AND status <> 'scrapped'
        "#,
    )
    .bind(batch_id)
    .bind(quantity)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Compute a FIFO suggestion for previewing an allocation before commit.
/// Takes no locks and mutates nothing; the suggestion may be stale by the
/// time the real allocation runs.
pub async fn propose(
    db: &PgPool,
    product_id: Uuid,
    branch_id: Uuid,
    quantity: Decimal,
) -> AppResult<FifoProposal> {
    let mut conn = db.acquire().await?;
    let product = fetch_product(&mut conn, product_id).await?;

    let (target_product, required) = match product.kind {
        ProductKind::Standard => {
            return Err(AppError::ValidationError(format!(
                "product '{}' is not batch-tracked",
                product.name
            )))
        }
        ProductKind::Tracked => (product.id, round_quantity(quantity)),
        ProductKind::Manufactured => {
            let recipe = product.recipe.as_ref().ok_or_else(|| {
                AppError::ValidationError(format!(
                    "manufactured product '{}' has no recipe",
                    product.name
                ))
            })?;
            (
                recipe.raw_product_id,
                required_raw_quantity(quantity, recipe.conversion_factor),
            )
        }
    };

    let rows = sqlx::query_as::<_, (Uuid, Uuid, Decimal, String)>(
        r#"
        SELECT id, product_id, remaining_quantity, status
        FROM inventory_batches
        WHERE product_id = $1 AND branch_id = $2 AND status = 'in_stock'
        ORDER BY created_at, id
        "#,
    )
    .bind(target_product)
    .bind(branch_id)
    .fetch_all(&mut *conn)
    .await?;

    let snapshots: AppResult<Vec<BatchSnapshot>> =
        rows.into_iter().map(snapshot_from_row).collect();
    Ok(propose_fifo(&snapshots?, required))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product(kind: ProductKind, recipe: Option<RecipeInfo>) -> ProductInfo {
        ProductInfo {
            id: Uuid::new_v4(),
            name: "test product".to_string(),
            kind,
            recipe,
        }
    }

    #[test]
    fn standard_lines_touch_no_batches() {
        let p = product(ProductKind::Standard, None);
        assert!(line_stock_target(&p, dec("5")).unwrap().is_none());
    }

    #[test]
    fn tracked_lines_target_their_own_product() {
        let p = product(ProductKind::Tracked, None);
        let (target, required) = line_stock_target(&p, dec("5")).unwrap().unwrap();
        assert_eq!(target, p.id);
        assert_eq!(required, dec("5.000"));
    }

    #[test]
    fn manufactured_lines_target_the_raw_product() {
        let raw = Uuid::new_v4();
        let p = product(
            ProductKind::Manufactured,
            Some(RecipeInfo {
                raw_product_id: raw,
                conversion_factor: dec("2.5"),
            }),
        );
        let (target, required) = line_stock_target(&p, dec("10")).unwrap().unwrap();
        assert_eq!(target, raw);
        assert_eq!(required, dec("25.000"));
    }

    #[test]
    fn manufactured_without_recipe_is_rejected() {
        let p = product(ProductKind::Manufactured, None);
        assert!(line_stock_target(&p, dec("1")).is_err());
    }
}
