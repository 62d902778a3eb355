//! Route definitions for the warehouse ledger API

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    handlers,
    middleware::{auth_middleware, idempotency_guard},
    AppState,
};

/// Create API routes
///
/// Everything except `/health` sits behind authentication. The idempotency guard runs inside
/// the auth layer, so unauthenticated requests never claim a key.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/inbound", inbound_routes())
        .nest("/outbound", outbound_routes())
        .nest("/stock", stock_routes())
        .nest("/notifications", notification_routes())
        .nest("/settings", settings_routes())
        .route_layer(middleware::from_fn_with_state(
            state.idempotency.clone(),
            idempotency_guard,
        ))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(state.config.auth.clone()),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected)
}

/// Inbound order routes
fn inbound_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_inbound).post(handlers::create_inbound))
        .route("/immediate", post(handlers::create_inbound_immediate))
        .route(
            "/:code",
            get(handlers::get_inbound).put(handlers::replace_inbound),
        )
        .route("/:code/approve", post(handlers::approve_inbound))
        .route("/:code/putaway", post(handlers::putaway_inbound))
        .route("/:code/cancel", post(handlers::cancel_inbound))
}

/// Outbound order routes
fn outbound_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_outbound).post(handlers::create_outbound))
        .route("/immediate", post(handlers::create_outbound_immediate))
        .route(
            "/:code",
            get(handlers::get_outbound).put(handlers::replace_outbound),
        )
        .route("/:code/approve", post(handlers::approve_outbound))
        .route("/:code/pick", post(handlers::pick_outbound))
        .route("/:code/cancel", post(handlers::cancel_outbound))
}

/// Stock ledger routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_stock))
        .route("/movements", get(handlers::list_movements))
        .route("/reconciliation", get(handlers::reconcile_stock))
        .route("/adjust", post(handlers::adjust_stock))
        .route("/transfer", post(handlers::transfer_stock))
}

/// Notification inbox routes
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/:id/read", post(handlers::mark_notification_read))
}

/// Alert threshold routes
fn settings_routes() -> Router<AppState> {
    Router::new().route(
        "/alerts",
        get(handlers::get_alert_settings).put(handlers::update_alert_settings),
    )
}
