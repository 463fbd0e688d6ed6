//! Purchase order HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::services::purchases::{CreatePurchaseInput, PurchaseListQuery, PurchaseService};
use crate::AppState;

fn purchase_service(state: &AppState) -> PurchaseService {
    PurchaseService::new(state.db.clone(), state.config.engine.lock_timeout_ms)
}

/// Create a purchase order and take its batches into stock
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseInput>,
) -> impl IntoResponse {
    match purchase_service(&state).create_purchase(input).await {
        Ok(detail) => (StatusCode::CREATED, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List purchase orders
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchaseListQuery>,
) -> impl IntoResponse {
    match purchase_service(&state).list_purchases(query).await {
        Ok(orders) => {
            (StatusCode::OK, Json(serde_json::json!({ "orders": orders }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Get a purchase order with its items and intake batches
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match purchase_service(&state).get_purchase(order_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Void a purchase order while its intake batches are untouched
pub async fn cancel_purchase(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match purchase_service(&state).cancel_purchase(order_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
