pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::rewrite::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/health", get(health::health_handler))
        // Rewrite API
        .route("/api/models", get(handlers::handle_models))
        .route("/api/rewrite", post(handlers::handle_rewrite))
        .route("/api/download", post(handlers::handle_download))
        .with_state(state)
}
