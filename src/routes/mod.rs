// Routes module - wires every HTTP endpoint onto the shared state

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::handlers::*;

pub fn router(state: AppState) -> Router {
    Router::new()
        // ===== HEALTH CHECK =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // ===== REQUEST LIFECYCLE =====
        .route("/requests", post(create_request))
        .route("/requests/available", get(list_available))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requests/:id/accept", post(accept_request))
        .route("/requests/:id/complete", post(complete_request))
        .route("/requests/:id/fail", post(fail_request))
        .route("/requests/:id/retry", post(retry_request))
        .route("/requests/:id/fulfill", post(fulfill_request))
        // ===== PROVIDING MODE =====
        .route("/providing", post(set_providing))
        // ===== ACCOUNT VIEWS =====
        .route("/accounts/:id/outgoing", get(get_outgoing))
        .route("/accounts/:id/incoming", get(get_incoming))
        .route("/accounts/:id/fulfilled", get(get_fulfilled))
        .route("/accounts/:id/summary", get(get_summary))
        .route("/stats", get(get_stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
