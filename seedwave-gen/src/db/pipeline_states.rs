//! Durable pipeline state
//!
//! Writes are conditional: once a row holds a terminal status it is never
//! overwritten, so a cancellation recorded by another task always wins over
//! a stage that finishes afterwards.

use chrono::Utc;
use seedwave_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::retry::LockRetry;
use crate::models::{ErrorCode, PipelineState, PipelineStatus};

/// Insert or update the state; `false` means a terminal state was already stored
pub async fn save_state(pool: &SqlitePool, state: &PipelineState) -> Result<bool> {
    let run_id = state.run_id.to_string();
    let json = serde_json::to_string(state)
        .map_err(|e| Error::Internal(format!("Failed to serialize pipeline state: {}", e)))?;
    let status = state.status.as_str();
    let started_at = state.started_at.to_rfc3339();
    let completed_at = state.completed_at.map(|dt| dt.to_rfc3339());
    let updated_at = Utc::now().to_rfc3339();

    LockRetry::default().run("save_state", || async {
        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_states (
                run_id, user_id, status, progress, state, started_at, updated_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                state = excluded.state,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at
            WHERE pipeline_states.status NOT IN ('complete', 'failed')
            "#,
        )
        .bind(&run_id)
        .bind(&state.user_id)
        .bind(status)
        .bind(state.progress as i64)
        .bind(&json)
        .bind(&started_at)
        .bind(&updated_at)
        .bind(&completed_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok::<bool, Error>(result.rows_affected() > 0)
    })
    .await
}

pub async fn load_state(pool: &SqlitePool, run_id: Uuid) -> Result<Option<PipelineState>> {
    let row = sqlx::query("SELECT state FROM pipeline_states WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let json: String = row.get("state");
            let state = serde_json::from_str(&json).map_err(|e| {
                Error::Internal(format!("Failed to deserialize pipeline state: {}", e))
            })?;
            Ok(Some(state))
        }
        None => Ok(None),
    }
}

/// Ids of runs not yet in a terminal state
pub async fn find_unfinished(pool: &SqlitePool) -> Result<Vec<Uuid>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT run_id FROM pipeline_states WHERE status NOT IN ('complete', 'failed')",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id,)| {
            Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("Bad run id {}: {}", id, e)))
        })
        .collect()
}

/// Fail runs left unfinished by a previous process
///
/// Their background tasks died with the process, so they would otherwise
/// report a stale in-progress status forever.
pub async fn fail_interrupted_runs(pool: &SqlitePool) -> Result<Vec<PipelineState>> {
    let mut failed = Vec::new();
    for run_id in find_unfinished(pool).await? {
        let Some(mut state) = load_state(pool, run_id).await? else {
            continue;
        };
        if state.is_terminal() {
            continue;
        }
        let stage: PipelineStatus = state.status;
        if state
            .fail(
                ErrorCode::UpstreamUnavailable,
                format!("run interrupted by service restart during {}", stage),
            )
            .is_ok()
            && save_state(pool, &state).await?
        {
            failed.push(state);
        }
    }
    Ok(failed)
}
