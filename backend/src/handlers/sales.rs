//! Sales order HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::services::production::{ProductionService, TransitionInput};
use crate::services::sales::{
    ConfirmPaymentInput, CreateSaleInput, SaleListQuery, SalesService,
};
use crate::AppState;

fn sales_service(state: &AppState) -> SalesService {
    SalesService::new(state.db.clone(), state.config.engine.lock_timeout_ms)
}

/// Create a sale (invoice, draft, or quotation)
pub async fn create_sale(
    State(state): State<AppState>,
    Json(input): Json<CreateSaleInput>,
) -> impl IntoResponse {
    match sales_service(&state).create_sale(input).await {
        Ok(detail) => (StatusCode::CREATED, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List sales orders
pub async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<SaleListQuery>,
) -> impl IntoResponse {
    match sales_service(&state).list_sales(query).await {
        Ok(orders) => {
            (StatusCode::OK, Json(serde_json::json!({ "orders": orders }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Get a sales order with its items and batch assignments
pub async fn get_sale(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match sales_service(&state).get_sale(order_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Void a sale, restoring stock and reversing the ledger
pub async fn cancel_sale(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match sales_service(&state).cancel_sale(order_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record a payment against a sales order
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ConfirmPaymentInput>,
) -> impl IntoResponse {
    match sales_service(&state).confirm_payment(order_id, input).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Move a sales order through the production workflow
pub async fn transition_production(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<TransitionInput>,
) -> impl IntoResponse {
    let service = ProductionService::new(state.db.clone(), state.config.engine.lock_timeout_ms);
    match service.transition(order_id, input).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    }
}
