//! seedwave-gen library interface
//!
//! Exposes the pipeline, persistence, and HTTP router for the binary and
//! for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use seedwave_common::events::{EventBus, SeedwaveEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::ErrorCode;
use crate::services::PipelineOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last run failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::run_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Keep `last_error` current from `RunFailed` events
///
/// Cancellations are not errors and are skipped.
pub fn spawn_failure_tracker(state: &AppState) -> tokio::task::JoinHandle<()> {
    let mut rx = state.event_bus.subscribe();
    let last_error = Arc::clone(&state.last_error);

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SeedwaveEvent::RunFailed {
                    run_id,
                    code,
                    stage,
                    message,
                    ..
                }) if code != ErrorCode::Cancelled.as_str() => {
                    *last_error.write().await = Some(format!(
                        "run {} failed during {} ({}): {}",
                        run_id, stage, code, message
                    ));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "Failure tracker lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
