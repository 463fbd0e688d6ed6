//! Ledger HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::services::ledger::{AdjustmentInput, LedgerService};
use crate::AppState;
use shared::types::DateRange;

#[derive(Debug, serde::Deserialize)]
pub struct StatementQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Statement of a contact's ledger entries and running balance
pub async fn get_statement(
    State(state): State<AppState>,
    Path(contact_id): Path<Uuid>,
    Query(query): Query<StatementQuery>,
) -> impl IntoResponse {
    let range = match (query.start, query.end) {
        (Some(start), Some(end)) => Some(DateRange { start, end }),
        _ => None,
    };
    let service = LedgerService::new(state.db.clone());
    match service.statement(contact_id, range).await {
        Ok(statement) => (StatusCode::OK, Json(statement)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record a manual ledger adjustment for a contact
pub async fn create_adjustment(
    State(state): State<AppState>,
    Json(input): Json<AdjustmentInput>,
) -> impl IntoResponse {
    let service = LedgerService::new(state.db.clone());
    match service.adjust(input).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "prior_balance": outcome.prior_balance,
                "new_balance": outcome.new_balance,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
