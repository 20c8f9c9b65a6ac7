//! Server-Sent Events endpoints

use crate::{error::ApiResult, AppState};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use seedwave_common::sse::{create_event_bus_sse_stream, HEARTBEAT_INTERVAL};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// GET /events - run lifecycle events of every run
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_event_bus_sse_stream("seedwave-gen", &state.event_bus)
}

/// GET /runs/:run_id/stream - status snapshots until the run is terminal
///
/// Each `RunStatus` event carries the same JSON as GET /runs/:run_id. The
/// stream closes after the terminal snapshot.
pub async fn run_status_stream(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 404 up front instead of an error event on an open stream
    state.orchestrator.snapshot(run_id).await?;
    info!(run_id = %run_id, "SSE client subscribed to run status");

    let interval = state.orchestrator.settings().status_interval;
    let stream = Arc::clone(&state.orchestrator)
        .status_stream(run_id, interval)
        .filter_map(move |item| async move {
            match item {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => Some(Ok(Event::default().event("RunStatus").data(json))),
                    Err(e) => {
                        warn!(run_id = %run_id, "SSE: Failed to serialize status: {}", e);
                        None
                    }
                },
                Err(e) => Some(Ok(Event::default().event("error").data(e.to_string()))),
            }
        });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    ))
}
