//! HTTP trigger surface.
//!
//! | Route          | Answer                                              |
//! |----------------|-----------------------------------------------------|
//! | `GET /health`  | `{"status":"ok","running":bool}`                    |
//! | `POST /sync`   | `200` + RunResult, or `409 {"status":"already_running"}` |
//!
//! `/sync` also answers `GET` and takes `dry_run` / `force` query flags.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use kbsync_sync::{Coordinator, RunOptions, RunOutcome};

use crate::protocol::{BusyResponse, HealthResponse};

pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", get(trigger_sync).post(trigger_sync))
        .with_state(coordinator)
}

async fn health(State(coordinator): State<Coordinator>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(coordinator.is_running()))
}

async fn trigger_sync(
    State(coordinator): State<Coordinator>,
    Query(options): Query<RunOptions>,
) -> Response {
    tracing::info!(dry_run = options.dry_run, force = options.force, "sync requested over HTTP");
    match coordinator.try_run(options).await {
        RunOutcome::Completed(result) => (StatusCode::OK, Json(result)).into_response(),
        RunOutcome::AlreadyRunning => {
            (StatusCode::CONFLICT, Json(BusyResponse::already_running())).into_response()
        }
    }
}
