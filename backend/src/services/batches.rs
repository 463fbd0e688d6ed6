//! Batch registration and stock maintenance outside the purchase flow:
//! manual registration, quantity adjustment, scrapping, and branch transfer.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::allocation::{self, fetch_product};
use crate::services::purchases::instance_code_conflict;
use crate::services::sequence::{next_sequence, set_lock_timeout, SequenceScope};
use shared::allocation::FifoProposal;
use shared::models::{BatchStatus, InventoryBatch, ProductKind};
use shared::types::{round_quantity, Pagination};
use shared::validation;

#[derive(Debug, serde::Deserialize)]
pub struct RegisterBatchInput {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_type_id: Option<Uuid>,
    /// Pre-printed tag; generated from the batch-type sequence when absent
    pub instance_code: Option<String>,
    pub quantity: Decimal,
}

#[derive(Debug, serde::Deserialize)]
pub struct AdjustBatchInput {
    /// Signed correction applied to `remaining_quantity`
    pub quantity_change: Decimal,
}

#[derive(Debug, serde::Deserialize)]
pub struct TransferBatchInput {
    pub target_branch_id: Uuid,
}

#[derive(Debug, serde::Deserialize)]
pub struct BatchListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub product_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub status: Option<BatchStatus>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ProposalQuery {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
    lock_timeout_ms: u32,
}

impl BatchService {
    pub fn new(db: PgPool, lock_timeout_ms: u32) -> Self {
        Self {
            db,
            lock_timeout_ms,
        }
    }

    /// Register a batch outside the purchase flow (opening stock, found
    /// stock). The product must be batch-tracked.
    pub async fn register(&self, input: RegisterBatchInput) -> AppResult<InventoryBatch> {
        let quantity = round_quantity(input.quantity);
        validation::validate_quantity(quantity).map_err(|m| AppError::Validation {
            field: "quantity".to_string(),
            message: m.to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let product = fetch_product(&mut tx, input.product_id).await?;
        if product.kind != ProductKind::Tracked {
            return Err(AppError::ValidationError(format!(
                "product '{}' is not batch-tracked",
                product.name
            )));
        }

        let code = match &input.instance_code {
            Some(code) => code.clone(),
            None => {
                let batch_type_id = input.batch_type_id.ok_or_else(|| {
                    AppError::ValidationError(
                        "batch_type_id is required to generate an instance code".to_string(),
                    )
                })?;
                let type_code: String =
                    sqlx::query_scalar("SELECT code FROM batch_types WHERE id = $1")
                        .bind(batch_type_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or_else(|| {
                            AppError::NotFound(format!("Batch type {batch_type_id}"))
                        })?;
                next_sequence(
                    &mut tx,
                    &SequenceScope::Instance {
                        type_code,
                        product_id: input.product_id,
                        branch_id: input.branch_id,
                    },
                    Utc::now().date_naive(),
                )
                .await?
            }
        };

        let batch_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO inventory_batches
                (product_id, branch_id, batch_type_id, instance_code,
                 initial_quantity, remaining_quantity)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id
            "#,
        )
        .bind(input.product_id)
        .bind(input.branch_id)
        .bind(input.batch_type_id)
        .bind(&code)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| instance_code_conflict(e, &code))?;

        tx.commit().await?;

        tracing::info!(instance_code = %code, %quantity, "batch registered");
        self.get_batch(batch_id).await
    }

    /// Apply a signed stock correction. The result must stay non-negative;
    /// the depleted flag follows the resulting quantity. Scrapped batches
    /// cannot be adjusted.
    pub async fn adjust(&self, batch_id: Uuid, input: AdjustBatchInput) -> AppResult<InventoryBatch> {
        let change = round_quantity(input.quantity_change);
        if change.is_zero() {
            return Err(AppError::ValidationError(
                "quantity_change must be non-zero".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let (code, remaining, status) = lock_batch(&mut tx, batch_id).await?;
        if status == BatchStatus::Scrapped {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: format!("batch {code} is scrapped and cannot be adjusted"),
            });
        }

        let new_remaining = remaining + change;
        if new_remaining < Decimal::ZERO {
            return Err(AppError::InsufficientStock(format!(
                "batch {code} holds {remaining}; adjusting by {change} would go negative"
            )));
        }
        let new_status = if new_remaining.is_zero() {
            BatchStatus::Depleted
        } else {
            BatchStatus::InStock
        };

        sqlx::query(
            "UPDATE inventory_batches SET remaining_quantity = $2, status = $3 WHERE id = $1",
        )
        .bind(batch_id)
        .bind(new_remaining)
        .bind(new_status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(instance_code = %code, %change, "batch adjusted");
        self.get_batch(batch_id).await
    }

    /// Take a batch out of circulation permanently. Remaining quantity stays
    /// on record for the write-off; the batch never returns to stock.
    pub async fn scrap(&self, batch_id: Uuid) -> AppResult<InventoryBatch> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let (code, _, status) = lock_batch(&mut tx, batch_id).await?;
        if status != BatchStatus::Scrapped {
            sqlx::query("UPDATE inventory_batches SET status = 'scrapped' WHERE id = $1")
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(instance_code = %code, "batch scrapped");
        self.get_batch(batch_id).await
    }

    /// Move a batch to another branch. Only in-stock batches move; history
    /// (assignments, source purchase) stays attached.
    pub async fn transfer(
        &self,
        batch_id: Uuid,
        input: TransferBatchInput,
    ) -> AppResult<InventoryBatch> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        let (code, _, status) = lock_batch(&mut tx, batch_id).await?;
        if status != BatchStatus::InStock {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: format!(
                    "batch {code} is {} and cannot be transferred",
                    status.as_str()
                ),
            });
        }

        sqlx::query("UPDATE inventory_batches SET branch_id = $2 WHERE id = $1")
            .bind(batch_id)
            .bind(input.target_branch_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(instance_code = %code, target = %input.target_branch_id, "batch transferred");
        self.get_batch(batch_id).await
    }

    /// FIFO allocation preview; takes no locks and mutates nothing
    pub async fn propose(&self, query: ProposalQuery) -> AppResult<FifoProposal> {
        allocation::propose(
            &self.db,
            query.product_id,
            query.branch_id,
            round_quantity(query.quantity),
        )
        .await
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<InventoryBatch> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, branch_id, batch_type_id, instance_code,
                   initial_quantity, remaining_quantity, status, created_at
            FROM inventory_batches
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Batch {batch_id}")))?;
        row.into_model()
    }

    pub async fn list_batches(&self, query: BatchListQuery) -> AppResult<Vec<InventoryBatch>> {
        let pagination = Pagination::from_params(query.page, query.per_page);
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, branch_id, batch_type_id, instance_code,
                   initial_quantity, remaining_quantity, status, created_at
            FROM inventory_batches
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR branch_id = $2)
              AND ($3::varchar IS NULL OR status = $3)
            ORDER BY created_at, id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(query.product_id)
        .bind(query.branch_id)
        .bind(query.status.map(|s| s.as_str().to_string()))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(BatchRow::into_model).collect()
    }
}

/// Lock one batch row and return (instance_code, remaining, status)
async fn lock_batch(
    conn: &mut sqlx::PgConnection,
    batch_id: Uuid,
) -> AppResult<(String, Decimal, BatchStatus)> {
    let row = sqlx::query_as::<_, (String, Decimal, String)>(
        "SELECT instance_code, remaining_quantity, status
         FROM inventory_batches WHERE id = $1 FOR UPDATE",
    )
    .bind(batch_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Batch {batch_id}")))?;

    let status = BatchStatus::parse(&row.2)
        .ok_or_else(|| AppError::Internal(format!("unknown batch status '{}'", row.2)))?;
    Ok((row.0, row.1, status))
}

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    branch_id: Uuid,
    batch_type_id: Option<Uuid>,
    instance_code: String,
    initial_quantity: Decimal,
    remaining_quantity: Decimal,
    status: String,
    created_at: chrono::DateTime<Utc>,
}

impl BatchRow {
    fn into_model(self) -> AppResult<InventoryBatch> {
        let status = BatchStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(format!("unknown batch status '{}'", self.status)))?;
        Ok(InventoryBatch {
            id: self.id,
            product_id: self.product_id,
            branch_id: self.branch_id,
            batch_type_id: self.batch_type_id,
            instance_code: self.instance_code,
            initial_quantity: self.initial_quantity,
            remaining_quantity: self.remaining_quantity,
            status,
            created_at: self.created_at,
        })
    }
}
