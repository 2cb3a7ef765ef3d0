//! # HTTP Transport (§4.7, §6)
//!
//! A thin adapter: it performs no orchestration logic itself, only
//! translates requests into [`crate::orchestrator::BatchSupervisor`]
//! calls and results back into responses.

mod handlers;
mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::orchestrator::BatchSupervisor;

pub struct AppState {
    pub supervisor: Arc<BatchSupervisor>,
}

/// Build the router implementing the exact surface of §6. CORS preflight
/// (`OPTIONS *`) is handled by the permissive [`CorsLayer`] rather than an
/// explicit route.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/status/{batch_id}", get(handlers::get_status))
        .route("/callback/{batch_id}/{task_id}", post(handlers::handle_callback))
        .route("/admin/reset/{batch_id}", post(handlers::admin_reset))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
