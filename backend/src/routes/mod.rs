//! Route definitions for the Fabrication ERP Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Sales transactions
        .nest("/sales", sales_routes())
        // Purchase transactions
        .nest("/purchases", purchase_routes())
        // Returns (sales and purchase)
        .nest("/returns", return_routes())
        // Batch-tracked inventory
        .nest("/batches", batch_routes())
        // Contact ledger
        .nest("/ledger", ledger_routes())
}

fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_sale).get(handlers::list_sales))
        .route("/:id", get(handlers::get_sale).delete(handlers::cancel_sale))
        .route("/:id/payments", post(handlers::confirm_payment))
        .route("/:id/production", post(handlers::transition_production))
}

fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::create_purchase).get(handlers::list_purchases),
        )
        .route(
            "/:id",
            get(handlers::get_purchase).delete(handlers::cancel_purchase),
        )
}

fn return_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::create_return).get(handlers::list_returns),
        )
        .route("/:id", get(handlers::get_return))
        .route("/:id/approve", post(handlers::approve_return))
        .route("/:id/cancel", post(handlers::cancel_return))
}

fn batch_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::register_batch).get(handlers::list_batches),
        )
        .route("/proposal", get(handlers::propose_allocation))
        .route("/:id", get(handlers::get_batch))
        .route("/:id/adjust", post(handlers::adjust_batch))
        .route("/:id/scrap", post(handlers::scrap_batch))
        .route("/:id/transfer", post(handlers::transfer_batch))
}

fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/adjustments", post(handlers::create_adjustment))
        .route("/contacts/:id/statement", get(handlers::get_statement))
}
