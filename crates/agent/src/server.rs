//! Agent HTTP server
//!
//! JSON endpoints the controller drives: launch, cancel-launch, kill,
//! check, plus status/health probes.

use crate::launcher::LaunchEngine;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use gamerig_common::{
    ApiStatus, CancelResponse, CheckProcessResponse, Error, HealthResponse, KillProcessResponse,
    LaunchMethod, LaunchRequest, LaunchResponse, ProcessQuery, StatusResponse,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared server state
pub struct AppState {
    pub engine: LaunchEngine,
}

/// Build the agent router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/launch", post(launch))
        .route("/cancel_launch", post(cancel_launch))
        .route("/kill_process", post(kill_process))
        .route("/check_process", post(check_process))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn launch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LaunchRequest>,
) -> impl IntoResponse {
    if req.path.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LaunchResponse::error(
                LaunchMethod::DirectExe,
                "game path is required",
            )),
        );
    }

    match state.engine.launch(&req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e) => {
            error!("launch failed: {}", e);
            let code = match &e {
                // Unresolvable targets are the 404-class terminal errors
                Error::TargetResolution(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                code,
                Json(LaunchResponse::error(LaunchMethod::DirectExe, e.to_string())),
            )
        }
    }
}

async fn cancel_launch(State(state): State<Arc<AppState>>) -> Json<CancelResponse> {
    state.engine.cancel_launch();
    Json(CancelResponse {
        status: ApiStatus::Success,
        message: "launch cancellation requested".to_string(),
    })
}

async fn kill_process(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ProcessQuery>,
) -> impl IntoResponse {
    if query.process_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(KillProcessResponse {
                status: ApiStatus::Error,
                killed: false,
                process_name: query.process_name,
            }),
        );
    }

    let killed = state.engine.kill_process(&query.process_name);
    info!("kill_process '{}': killed={}", query.process_name, killed);
    (
        StatusCode::OK,
        Json(KillProcessResponse {
            status: ApiStatus::Success,
            killed,
            process_name: query.process_name,
        }),
    )
}

async fn check_process(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ProcessQuery>,
) -> impl IntoResponse {
    if query.process_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(CheckProcessResponse {
                status: ApiStatus::Error,
                running: false,
                pid: None,
                name: None,
            }),
        );
    }

    let found = state.engine.check_process(&query.process_name);
    (
        StatusCode::OK,
        Json(CheckProcessResponse {
            status: ApiStatus::Success,
            running: found.is_some(),
            pid: found.as_ref().map(|p| p.pid),
            name: found.map(|p| p.name),
        }),
    )
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: ApiStatus::Success,
        version: gamerig_common::VERSION.to_string(),
        capabilities: vec![
            "launch".to_string(),
            "cancel_launch".to_string(),
            "kill_process".to_string(),
            "check_process".to_string(),
            "window_foreground".to_string(),
        ],
        tracked_process: state.engine.tracked_process_name(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: ApiStatus::Success,
        version: gamerig_common::VERSION.to_string(),
        game_process: state.engine.tracked_state(),
    })
}
