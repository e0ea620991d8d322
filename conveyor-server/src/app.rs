use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, routing::get, routing::post, Router};

use crate::state::AppState;

/// Build the axum router with the provided shared application state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs", post(crate::handlers::jobs::submit))
        .route("/health", get(health_handler))
        .layer(Extension(state))
}

async fn health_handler() -> impl IntoResponse {
    // Liveness: always 200 while the process is alive.
    (axum::http::StatusCode::OK, "OK")
}
