//! Service health

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

const MODULE_NAME: &str = "seedwave-gen";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database does not answer
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: bool,
    /// Runs executing in this process
    pub active_runs: usize,
    /// Connected `/events` listeners
    pub event_subscribers: usize,
    /// Most recent run failure (cancellations excluded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

async fn database_reachable(state: &AppState) -> bool {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Health probe: database unreachable");
            false
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = database_reachable(&state).await;
    let uptime_seconds = (Utc::now() - state.startup_time).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        module: MODULE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        database,
        active_runs: state.orchestrator.active_run_count().await,
        event_subscribers: state.event_bus.subscriber_count(),
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
