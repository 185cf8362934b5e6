//! Camera routes.
//!
//! | Method | Path                        | Description                 |
//! |--------|-----------------------------|-----------------------------|
//! | GET    | `/api/cameras`              | Configured camera ids       |
//! | GET    | `/api/cameras/{id}`         | Status of one camera        |
//! | POST   | `/api/cameras/{id}/start`   | Queue a start command       |
//! | POST   | `/api/cameras/{id}/stop`    | Queue a stop command        |
//!
//! Start and stop answer `202 Accepted` once the command is queued. With
//! `?wait=true` they answer `200 OK` after the command ran.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{CameraListResponse, CommandQuery, CommandResponse};
use crate::api::server::AppState;
use crate::domain::CameraId;
use crate::registry::{CameraRegistry, CameraStatus, CommandKind, CommandOutcome, CommandTicket};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cameras))
        .route("/{id}", get(get_camera))
        .route("/{id}/start", post(start_camera))
        .route("/{id}/stop", post(stop_camera))
}

async fn list_cameras(State(state): State<AppState>) -> Json<CameraListResponse> {
    Json(CameraListResponse {
        cameras: state.registry.list(),
    })
}

async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<CameraStatus>> {
    match state.registry.status(id)?.wait().await {
        CommandOutcome::Status { status } => Ok(Json(status)),
        CommandOutcome::Failed { reason } => Err(ApiError::internal(reason)),
        other => Err(ApiError::internal(format!("unexpected outcome {:?}", other))),
    }
}

async fn start_camera(
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
    Query(query): Query<CommandQuery>,
) -> ApiResult<(StatusCode, Json<CommandResponse>)> {
    let ticket = state.registry.start(id)?;
    Ok(respond(&state.registry, ticket, query.wait).await)
}

async fn stop_camera(
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
    Query(query): Query<CommandQuery>,
) -> ApiResult<(StatusCode, Json<CommandResponse>)> {
    let ticket = state.registry.stop(id)?;
    Ok(respond(&state.registry, ticket, query.wait).await)
}

async fn respond(
    registry: &CameraRegistry,
    ticket: CommandTicket,
    wait: bool,
) -> (StatusCode, Json<CommandResponse>) {
    let camera_id = ticket.camera_id();
    let command: CommandKind = ticket.kind();

    if !wait {
        let pending = ticket.pending();
        return (
            StatusCode::ACCEPTED,
            Json(CommandResponse {
                camera_id,
                command,
                pending,
                outcome: None,
            }),
        );
    }

    let outcome = ticket.wait().await;
    let status = if outcome.is_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(CommandResponse {
            camera_id,
            command,
            pending: registry.pending(camera_id).unwrap_or(0),
            outcome: Some(outcome),
        }),
    )
}
