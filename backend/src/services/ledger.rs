//! Ledger engine: per-contact running balances over an append-only stream of
//! signed entries.
//!
//! Each economic event appends exactly one entry; the contact's
//! `ledger_balance` cache is updated eagerly for O(1) reads. Reversal deletes
//! the entry and replays the (contact, branch) stream in
//! `(transaction_date, created_at, id)` order to rebuild every
//! `balance_after` and the cache. The contact row is locked before any
//! balance read — last in the global lock order (after order and batches).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::ledger::{entry_balance, replay_balances, EntryDelta};
use shared::models::{LedgerEntry, LedgerEntryType};
use shared::types::{round_money, DateRange};
use shared::validation;

/// A new entry to append for a contact
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub contact_id: Uuid,
    pub branch_id: Uuid,
    pub transaction_date: NaiveDate,
    pub transaction_type: LedgerEntryType,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Balances observed while appending an entry
#[derive(Debug, Clone, Copy)]
pub struct AppendOutcome {
    /// Contact balance across all branches, before this entry
    pub prior_balance: Decimal,
    /// Contact balance across all branches, after this entry
    pub new_balance: Decimal,
}

/// Append one entry inside the caller's transaction. Locks the contact row,
/// computes the running balance, inserts the entry, and updates the cache.
pub async fn append_entry(conn: &mut PgConnection, entry: &NewEntry) -> AppResult<AppendOutcome> {
    let prior_balance = lock_contact_balance(conn, entry.contact_id).await?;

    // Running balance within this contact+branch stream
    let prior_branch: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT balance_after FROM ledger_entries
        WHERE contact_id = $1 AND branch_id = $2
        ORDER BY transaction_date DESC, created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(entry.contact_id)
    .bind(entry.branch_id)
    .fetch_optional(&mut *conn)
    .await?;

    let balance_after = entry_balance(
        prior_branch.unwrap_or(Decimal::ZERO),
        entry.debit_amount,
        entry.credit_amount,
    );

    sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (contact_id, branch_id, transaction_date, transaction_type,
             debit_amount, credit_amount, balance_after,
             reference_type, reference_id, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.contact_id)
    .bind(entry.branch_id)
    .bind(entry.transaction_date)
    .bind(entry.transaction_type.as_str())
    .bind(entry.debit_amount)
    .bind(entry.credit_amount)
    .bind(balance_after)
    .bind(&entry.reference_type)
    .bind(entry.reference_id)
    .bind(&entry.notes)
    .execute(&mut *conn)
    .await?;

    let new_balance = entry_balance(prior_balance, entry.debit_amount, entry.credit_amount);
    sqlx::query("UPDATE contacts SET ledger_balance = $2 WHERE id = $1")
        .bind(entry.contact_id)
        .bind(new_balance)
        .execute(&mut *conn)
        .await?;

    Ok(AppendOutcome {
        prior_balance,
        new_balance,
    })
}

/// Delete every entry recorded for a reference (a cancelled transaction) and
/// recalculate the affected contact streams.
pub async fn reverse_reference(
    conn: &mut PgConnection,
    reference_type: &str,
    reference_id: Uuid,
) -> AppResult<()> {
    let affected = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        DELETE FROM ledger_entries
        WHERE reference_type = $1 AND reference_id = $2
        RETURNING contact_id, branch_id
        "#,
    )
    .bind(reference_type)
    .bind(reference_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut seen: Vec<(Uuid, Uuid)> = Vec::new();
    for stream in affected {
        if !seen.contains(&stream) {
            recalculate(conn, stream.0, stream.1).await?;
            seen.push(stream);
        }
    }
    Ok(())
}

/// Rebuild the running balances of one (contact, branch) stream by replaying
/// every entry in order, then refresh the contact's cross-branch cache from
/// the surviving entries. Running this twice produces the same result.
pub async fn recalculate(
    conn: &mut PgConnection,
    contact_id: Uuid,
    branch_id: Uuid,
) -> AppResult<Decimal> {
    lock_contact_balance(conn, contact_id).await?;

    let rows = sqlx::query_as::<_, (Uuid, Decimal, Decimal, Decimal)>(
        r#"
        SELECT id, debit_amount, credit_amount, balance_after
        FROM ledger_entries
        WHERE contact_id = $1 AND branch_id = $2
        ORDER BY transaction_date, created_at, id
        "#,
    )
    .bind(contact_id)
    .bind(branch_id)
    .fetch_all(&mut *conn)
    .await?;

    let deltas: Vec<EntryDelta> = rows
        .iter()
        .map(|r| EntryDelta {
            debit: r.1,
            credit: r.2,
        })
        .collect();
    let balances = replay_balances(Decimal::ZERO, &deltas);

    for (row, balance) in rows.iter().zip(&balances) {
        if row.3 != *balance {
            sqlx::query("UPDATE ledger_entries SET balance_after = $2 WHERE id = $1")
                .bind(row.0)
                .bind(balance)
                .execute(&mut *conn)
                .await?;
        }
    }

    // Cache is the signed sum across every branch of the contact
    let total: Decimal = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(debit_amount - credit_amount), 0)
        FROM ledger_entries
        WHERE contact_id = $1
        "#,
    )
    .bind(contact_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE contacts SET ledger_balance = $2 WHERE id = $1")
        .bind(contact_id)
        .bind(total)
        .execute(&mut *conn)
        .await?;

    Ok(total)
}

/// Lock the contact row and return its cached balance
async fn lock_contact_balance(conn: &mut PgConnection, contact_id: Uuid) -> AppResult<Decimal> {
    sqlx::query_scalar::<_, Decimal>("SELECT ledger_balance FROM contacts WHERE id = $1 FOR UPDATE")
        .bind(contact_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Contact {contact_id}")))
}

/// Input for a manual ledger adjustment
#[derive(Debug, serde::Deserialize)]
pub struct AdjustmentInput {
    pub contact_id: Uuid,
    pub branch_id: Uuid,
    pub transaction_date: Option<NaiveDate>,
    pub debit_amount: Option<Decimal>,
    pub credit_amount: Option<Decimal>,
    pub notes: Option<String>,
}

/// A contact statement: the entry stream plus the cached balance
#[derive(Debug, serde::Serialize)]
pub struct ContactStatement {
    pub contact_id: Uuid,
    pub ledger_balance: Decimal,
    pub entries: Vec<LedgerEntry>,
}

/// Ledger service for reads and manual adjustments
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

impl LedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a manual adjustment entry for a contact
    pub async fn adjust(&self, input: AdjustmentInput) -> AppResult<AppendOutcome> {
        let debit = round_money(input.debit_amount.unwrap_or(Decimal::ZERO));
        let credit = round_money(input.credit_amount.unwrap_or(Decimal::ZERO));
        if debit < Decimal::ZERO || credit < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "Adjustment amounts cannot be negative".to_string(),
            ));
        }
        if debit.is_zero() && credit.is_zero() {
            return Err(AppError::ValidationError(
                "Adjustment must carry a debit or credit amount".to_string(),
            ));
        }
        if let Some(notes) = &input.notes {
            validation::validate_identity(notes).map_err(|m| AppError::Validation {
                field: "notes".to_string(),
                message: m.to_string(),
            })?;
        }

        let today = chrono::Utc::now().date_naive();
        let transaction_date = input.transaction_date.unwrap_or(today);

        let mut tx = self.db.begin().await?;
        let outcome = append_entry(
            &mut tx,
            &NewEntry {
                contact_id: input.contact_id,
                branch_id: input.branch_id,
                transaction_date,
                transaction_type: LedgerEntryType::Adjustment,
                debit_amount: debit,
                credit_amount: credit,
                reference_type: None,
                reference_id: None,
                notes: input.notes,
            },
        )
        .await?;

        // A backdated entry lands mid-stream, so the running balances after
        // its date are stale until the stream is replayed in date order
        if transaction_date < today {
            recalculate(&mut tx, input.contact_id, input.branch_id).await?;
        }

        tx.commit().await?;

        Ok(outcome)
    }

    /// Statement for a contact, optionally bounded by a date range
    pub async fn statement(
        &self,
        contact_id: Uuid,
        range: Option<DateRange>,
    ) -> AppResult<ContactStatement> {
        let balance: Decimal =
            sqlx::query_scalar("SELECT ledger_balance FROM contacts WHERE id = $1")
                .bind(contact_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;

        let (start, end) = match &range {
            Some(r) => (Some(r.start), Some(r.end)),
            None => (None, None),
        };

        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                Uuid,
                NaiveDate,
                String,
                Decimal,
                Decimal,
                Decimal,
                Option<String>,
                Option<Uuid>,
                Option<String>,
                chrono::DateTime<chrono::Utc>,
            ),
        >(
            r#"
            SELECT id, contact_id, branch_id, transaction_date, transaction_type,
                   debit_amount, credit_amount, balance_after,
                   reference_type, reference_id, notes, created_at
            FROM ledger_entries
            WHERE contact_id = $1
              AND ($2::date IS NULL OR transaction_date >= $2)
              AND ($3::date IS NULL OR transaction_date <= $3)
            ORDER BY transaction_date, created_at, id
            "#,
        )
        .bind(contact_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        let entries = rows
            .into_iter()
            .map(|r| {
                let transaction_type = LedgerEntryType::parse(&r.4).ok_or_else(|| {
                    AppError::Internal(format!("unknown ledger entry type '{}'", r.4))
                })?;
                Ok(LedgerEntry {
                    id: r.0,
                    contact_id: r.1,
                    branch_id: r.2,
                    transaction_date: r.3,
                    transaction_type,
                    debit_amount: r.5,
                    credit_amount: r.6,
                    balance_after: r.7,
                    reference_type: r.8,
                    reference_id: r.9,
                    notes: r.10,
                    created_at: r.11,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ContactStatement {
            contact_id,
            ledger_balance: balance,
            entries,
        })
    }
}
