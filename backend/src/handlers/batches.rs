//! Inventory batch HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::services::batches::{
    AdjustBatchInput, BatchListQuery, BatchService, ProposalQuery, RegisterBatchInput,
    TransferBatchInput,
};
use crate::AppState;

fn batch_service(state: &AppState) -> BatchService {
    BatchService::new(state.db.clone(), state.config.engine.lock_timeout_ms)
}

/// Register a batch outside the purchase flow
pub async fn register_batch(
    State(state): State<AppState>,
    Json(input): Json<RegisterBatchInput>,
) -> impl IntoResponse {
    match batch_service(&state).register(input).await {
        Ok(batch) => (StatusCode::CREATED, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List inventory batches
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchListQuery>,
) -> impl IntoResponse {
    match batch_service(&state).list_batches(query).await {
        Ok(batches) => {
            (StatusCode::OK, Json(serde_json::json!({ "batches": batches }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Get a single batch
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> impl IntoResponse {
    match batch_service(&state).get_batch(batch_id).await {
        Ok(batch) => (StatusCode::OK, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Apply a signed stock correction to a batch
pub async fn adjust_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<AdjustBatchInput>,
) -> impl IntoResponse {
    match batch_service(&state).adjust(batch_id, input).await {
        Ok(batch) => (StatusCode::OK, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Scrap a batch, removing it from circulation permanently
pub async fn scrap_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> impl IntoResponse {
    match batch_service(&state).scrap(batch_id).await {
        Ok(batch) => (StatusCode::OK, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Move a batch to another branch
pub async fn transfer_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<TransferBatchInput>,
) -> impl IntoResponse {
    match batch_service(&state).transfer(batch_id, input).await {
        Ok(batch) => (StatusCode::OK, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Preview a FIFO allocation without locking or mutating stock
pub async fn propose_allocation(
    State(state): State<AppState>,
    Query(query): Query<ProposalQuery>,
) -> impl IntoResponse {
    match batch_service(&state).propose(query).await {
        Ok(proposal) => (StatusCode::OK, Json(proposal)).into_response(),
        Err(e) => e.into_response(),
    }
}
