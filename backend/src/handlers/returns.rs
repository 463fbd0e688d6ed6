//! Return HTTP handlers (sales and purchase returns)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::services::returns::{CreateReturnInput, ReturnListQuery, ReturnService};
use crate::AppState;

fn return_service(state: &AppState) -> ReturnService {
    ReturnService::new(state.db.clone(), state.config.engine.lock_timeout_ms)
}

/// Record a pending return against a sale or purchase
pub async fn create_return(
    State(state): State<AppState>,
    Json(input): Json<CreateReturnInput>,
) -> impl IntoResponse {
    match return_service(&state).create_return(input).await {
        Ok(detail) => (StatusCode::CREATED, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List returns
pub async fn list_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnListQuery>,
) -> impl IntoResponse {
    match return_service(&state).list_returns(query).await {
        Ok(returns) => {
            (StatusCode::OK, Json(serde_json::json!({ "returns": returns }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Get a return with its items
pub async fn get_return(
    State(state): State<AppState>,
    Path(return_id): Path<Uuid>,
) -> impl IntoResponse {
    match return_service(&state).get_return(return_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Approve a pending return, applying stock and ledger effects
pub async fn approve_return(
    State(state): State<AppState>,
    Path(return_id): Path<Uuid>,
) -> impl IntoResponse {
    match return_service(&state).approve_return(return_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Cancel a pending return
pub async fn cancel_return(
    State(state): State<AppState>,
    Path(return_id): Path<Uuid>,
) -> impl IntoResponse {
    match return_service(&state).cancel_return(return_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}
