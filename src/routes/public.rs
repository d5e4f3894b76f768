use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// `/auth/gate` is called server-to-server by the host login pipeline after it has verified
/// credentials, so it carries the pipeline's service key instead of an admin session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/gate
        // Allows the login of approved accounts and refuses pending/blocked ones.
        .route("/auth/gate", post(handlers::gate_check))
}
