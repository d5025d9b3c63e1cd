pub mod health;
pub mod jobs;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Job API: enqueue + status poll (producers of async work)
        .route("/api/v1/jobs", post(jobs::handle_enqueue))
        .route("/api/v1/jobs/:id", get(jobs::handle_status))
        .with_state(state)
}
