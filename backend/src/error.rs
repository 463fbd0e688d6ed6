//! Error handling for the Fabrication ERP Platform
//!
//! Business-rule violations abort the enclosing transaction and surface as
//! descriptive, entity-naming errors. Lock timeouts and unique-constraint
//! collisions are reported as retryable conflicts.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::allocation::AllocationError;
use shared::models::InvalidTransition;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors (rejected before any database access)
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule violations
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Product mismatch: {0}")]
    ProductMismatch(String),

    #[error("Assignment quantity mismatch: {0}")]
    AssignmentQuantityMismatch(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Duplicate instance code: {0}")]
    DuplicateInstanceCode(String),

    #[error("Conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    // Retryable conflicts
    #[error("Lock acquisition timed out")]
    LockTimeout,

    #[error("Unique constraint collision: {0}")]
    UniqueViolation(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // lock_not_available: lock_timeout expired while waiting
                Some("55P03") => return AppError::LockTimeout,
                Some("23505") => {
                    let constraint = db_err.constraint().unwrap_or("unique constraint");
                    return AppError::UniqueViolation(constraint.to_string());
                }
                _ => {}
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match &err {
            AllocationError::InsufficientStock { .. } | AllocationError::BatchShort { .. } => {
                AppError::InsufficientStock(err.to_string())
            }
            AllocationError::ProductMismatch { .. } => AppError::ProductMismatch(err.to_string()),
            AllocationError::QuantityMismatch { .. } => {
                AppError::AssignmentQuantityMismatch(err.to_string())
            }
            AllocationError::BatchUnavailable { batch_id, .. } => AppError::Conflict {
                resource: format!("batch {batch_id}"),
                message: err.to_string(),
            },
            AllocationError::NonPositiveQuantity(_) | AllocationError::DuplicateBatch(_) => {
                AppError::ValidationError(err.to_string())
            }
        }
    }
}

impl From<InvalidTransition> for AppError {
    fn from(err: InvalidTransition) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Set for transient conflicts the caller may retry
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorDetail {
    fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            field: None,
            retryable: false,
        }
    }

    fn retryable(code: &str, message: String) -> Self {
        Self {
            retryable: true,
            ..Self::new(code, message)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone())
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InsufficientStock(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INSUFFICIENT_STOCK", msg.clone()),
            ),
            AppError::ProductMismatch(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("PRODUCT_MISMATCH", msg.clone()),
            ),
            AppError::AssignmentQuantityMismatch(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("ASSIGNMENT_QUANTITY_MISMATCH", msg.clone()),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone()),
            ),
            AppError::DuplicateInstanceCode(code) => (
                StatusCode::CONFLICT,
                ErrorDetail::retryable(
                    "DUPLICATE_INSTANCE_CODE",
                    format!("Instance code {} already exists", code),
                ),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    field: Some(resource.clone()),
                    ..ErrorDetail::new("CONFLICT", message.clone())
                },
            ),
            AppError::LockTimeout => (
                StatusCode::CONFLICT,
                ErrorDetail::retryable(
                    "LOCK_TIMEOUT",
                    "Could not acquire the required locks in time".to_string(),
                ),
            ),
            AppError::UniqueViolation(constraint) => (
                StatusCode::CONFLICT,
                ErrorDetail::retryable(
                    "UNIQUE_VIOLATION",
                    format!("Concurrent write collided on {}", constraint),
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred".to_string()),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                ),
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
