//! Request handlers for the surface of §6.
//!
//! Handlers translate requests into [`BatchSupervisor`] calls and
//! [`ConveyorError`]s into status codes; they carry no orchestration
//! logic themselves — a malformed request is rejected (serde, via axum's
//! `Json` extractor) before a handler body ever runs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use tracing::{info, warn};

use conveyor_shared::domain::CallbackPayload;
use conveyor_shared::error::ConveyorError;

use super::types::{ErrorResponse, HealthResponse, OkResponse};
use super::AppState;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "conveyor-orchestration",
        timestamp: Utc::now(),
    })
}

pub async fn get_status(State(state): State<Arc<AppState>>, Path(batch_id): Path<String>) -> Response {
    match state.supervisor.get_status(&batch_id).await {
        Ok(view) => Json(view).into_response(),
        Err(ConveyorError::BatchNotFound { .. }) => not_found(&batch_id),
        Err(e) => internal_error(e),
    }
}

pub async fn handle_callback(
    State(state): State<Arc<AppState>>,
    Path((batch_id, task_id)): Path<(String, String)>,
    Json(payload): Json<CallbackPayload>,
) -> Response {
    match state.supervisor.handle_callback(&batch_id, task_id, payload).await {
        Ok(outcome) => {
            if !outcome.applied {
                info!(batch_id = %batch_id, "callback dropped: unknown task or batch already terminal");
            }
            Json(OkResponse::bare()).into_response()
        }
        Err(ConveyorError::BatchNotFound { .. }) => not_found(&batch_id),
        Err(e) => internal_error(e),
    }
}

pub async fn admin_reset(State(state): State<Arc<AppState>>, Path(batch_id): Path<String>) -> Response {
    match state.supervisor.admin_reset(&batch_id).await {
        Ok(()) => Json(OkResponse::with_message("Batch reset")).into_response(),
        Err(ConveyorError::BatchNotFound { .. }) => not_found(&batch_id),
        Err(e) => internal_error(e),
    }
}

fn not_found(batch_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("batch {batch_id} not found"),
        }),
    )
        .into_response()
}

fn internal_error(e: ConveyorError) -> Response {
    warn!(error = %e, "unhandled error in HTTP handler");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
        .into_response()
}
