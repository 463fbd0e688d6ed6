//! Concurrency-safe generation of human-readable transaction numbers.
//!
//! Numbers (`INV-20260827-0001`, purchase orders, returns, batch instance
//! codes) reset daily per prefix+scope. Generation serializes on a Postgres
//! transaction-scoped advisory lock keyed by prefix+scope+day, acquired before
//! reading the day's maximum existing number, so no two transactions can
//! compute the same next value. The lock is held until the surrounding
//! transaction commits or rolls back; a bounded `lock_timeout` turns an
//! unacquirable lock into a retryable conflict for the caller.

use chrono::NaiveDate;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppResult;
use shared::sequence::{day_pattern, format_sequence, lock_key, parse_sequence};

/// What kind of number is being allocated, and within which scope the daily
/// counter resets.
#[derive(Debug, Clone)]
pub enum SequenceScope {
    /// Sales invoices: `INV-{date}-{n}`
    Invoice,
    /// Purchase orders: `PO-{date}-{n}`
    PurchaseOrder,
    /// Sales returns: `RET-{date}-{n}`
    SalesReturn,
    /// Purchase returns: `PRET-{date}-{n}`
    PurchaseReturn,
    /// Batch instance codes: `{batch type code}-{date}-{n}`, counter scoped
    /// per product+branch+batch type
    Instance {
        type_code: String,
        product_id: Uuid,
        branch_id: Uuid,
    },
}

impl SequenceScope {
    pub fn prefix(&self) -> &str {
        match self {
            SequenceScope::Invoice => "INV",
            SequenceScope::PurchaseOrder => "PO",
            SequenceScope::SalesReturn => "RET",
            SequenceScope::PurchaseReturn => "PRET",
            SequenceScope::Instance { type_code, .. } => type_code,
        }
    }

    /// Discriminator appended to the advisory lock key beyond the prefix
    fn scope_key(&self) -> String {
        match self {
            SequenceScope::Instance {
                product_id,
                branch_id,
                ..
            } => format!("{product_id}:{branch_id}"),
            _ => String::new(),
        }
    }
}

/// Bound every subsequent lock wait in this transaction. Must run after
/// `BEGIN`; `SET LOCAL` reverts on commit/rollback.
pub async fn set_lock_timeout(conn: &mut PgConnection, timeout_ms: u32) -> AppResult<()> {
    sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
        .execute(conn)
        .await?;
    Ok(())
}

/// Allocate the next number for `scope` on `date` inside the caller's
/// transaction. Serializes against all concurrent allocators for the same
/// prefix+scope+day.
pub async fn next_sequence(
    conn: &mut PgConnection,
    scope: &SequenceScope,
    date: NaiveDate,
) -> AppResult<String> {
    let key = lock_key(scope.prefix(), &scope.scope_key(), date);
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&key)
        .execute(&mut *conn)
        .await?;

    let max = max_existing(conn, scope, date).await?;
    Ok(format_sequence(
        scope.prefix(),
        date,
        max.map_or(1, |m| m + 1),
    ))
}

/// Highest counter already issued for this prefix+scope+day. Runs after the
/// advisory lock is held; never trust a value read before locking. Counters
/// are parsed from the full suffix, so numbers past 9999 (which widen the
/// zero-padded field) keep counting instead of wrapping.
async fn max_existing(
    conn: &mut PgConnection,
    scope: &SequenceScope,
    date: NaiveDate,
) -> AppResult<Option<u32>> {
    let pattern = day_pattern(scope.prefix(), date);

    let codes: Vec<String> = match scope {
        SequenceScope::Invoice => {
            sqlx::query_scalar(
                "SELECT invoice_number FROM sales_orders WHERE invoice_number LIKE $1",
            )
            .bind(&pattern)
            .fetch_all(conn)
            .await?
        }
        SequenceScope::PurchaseOrder => {
            sqlx::query_scalar("SELECT po_number FROM purchase_orders WHERE po_number LIKE $1")
                .bind(&pattern)
                .fetch_all(conn)
                .await?
        }
        SequenceScope::SalesReturn | SequenceScope::PurchaseReturn => {
            sqlx::query_scalar("SELECT return_number FROM returns WHERE return_number LIKE $1")
                .bind(&pattern)
                .fetch_all(conn)
                .await?
        }
        SequenceScope::Instance {
            product_id,
            branch_id,
            ..
        } => {
            sqlx::query_scalar(
                "SELECT instance_code FROM inventory_batches
                 WHERE instance_code LIKE $1 AND product_id = $2 AND branch_id = $3",
            )
            .bind(&pattern)
            .bind(product_id)
            .bind(branch_id)
            .fetch_all(conn)
            .await?
        }
    };

    Ok(codes
        .iter()
        .filter_map(|code| parse_sequence(scope.prefix(), date, code))
        .max())
}
