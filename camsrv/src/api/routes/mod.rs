//! API route definitions.

pub mod cameras;
pub mod health;
pub mod logging;
pub mod rpc;

use axum::{Router, routing::post};

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/cameras", cameras::router())
        .nest("/api/logging", logging::router())
        .route("/rpc", post(rpc::handle))
        .with_state(state)
}
