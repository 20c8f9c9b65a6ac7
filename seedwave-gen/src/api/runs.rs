//! Run management handlers
//!
//! POST /runs, GET /runs/:run_id, POST /runs/:run_id/cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{PipelineStatus, PlaylistSize, Preferences, RunStatus, SeedTrackInput},
    AppState,
};

/// POST /runs request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub user_id: String,
    pub query: String,
    /// One of 15, 30, 50, 75, 100
    pub playlist_size: u32,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

/// POST /runs response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: Uuid,
    pub status: PipelineStatus,
    pub progress: u8,
}

/// POST /runs
///
/// Creates the run in `pending` and starts it in the background.
/// Returns 202 Accepted; progress is read via GET /runs/:run_id.
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> ApiResult<(StatusCode, Json<CreateRunResponse>)> {
    let playlist_size =
        PlaylistSize::try_from(request.playlist_size).map_err(ApiError::BadRequest)?;

    let input = SeedTrackInput {
        query: request.query,
        playlist_size,
        preferences: request.preferences,
    };

    let snapshot = state.orchestrator.submit(&request.user_id, input).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateRunResponse {
            run_id: snapshot.run_id,
            status: snapshot.status,
            progress: snapshot.progress,
        }),
    ))
}

/// GET /runs/:run_id
pub async fn get_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunStatus>> {
    let snapshot = state.orchestrator.status(run_id).await?;
    Ok(Json(snapshot))
}

/// POST /runs/:run_id/cancel
///
/// 409 when the run already finished.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunStatus>> {
    let snapshot = state.orchestrator.cancel(run_id).await?;
    Ok(Json(snapshot))
}

/// Build run management routes
pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", post(create_run))
        .route("/runs/:run_id", get(get_run_status))
        .route("/runs/:run_id/cancel", post(cancel_run))
        .route("/runs/:run_id/stream", get(super::run_status_stream))
}
