//! Playlist run records
//!
//! The run record is the summary other services read: status, resolved
//! track, final playlist, track count, processing time.

use chrono::{DateTime, Utc};
use seedwave_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{PipelineState, PipelineStatus, PlaylistTrack, ResolvedTrack};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub user_id: String,
    pub query: String,
    pub playlist_size: u32,
    pub status: PipelineStatus,
    pub resolved_track: Option<ResolvedTrack>,
    pub playlist: Option<Vec<PlaylistTrack>>,
    pub track_count: usize,
    pub processing_ms: Option<u64>,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert the record for a freshly created run
pub async fn create_run(pool: &SqlitePool, state: &PipelineState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO playlist_runs (run_id, user_id, query, playlist_size, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(state.run_id.to_string())
    .bind(&state.user_id)
    .bind(&state.input.query)
    .bind(u32::from(state.input.playlist_size) as i64)
    .bind(state.status.as_str())
    .bind(state.started_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the final outcome of a run
pub async fn finalize_run(pool: &SqlitePool, state: &PipelineState, processing_ms: u64) -> Result<()> {
    let resolved = state
        .resolved_track
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let playlist = if state.status == PipelineStatus::Complete {
        Some(serde_json::to_string(&state.playlist)?)
    } else {
        None
    };
    let completed_at = state.completed_at.unwrap_or_else(Utc::now).to_rfc3339();

    sqlx::query(
        r#"
        UPDATE playlist_runs SET
            status = ?,
            resolved_track = ?,
            playlist = ?,
            track_count = ?,
            processing_ms = ?,
            error_code = ?,
            completed_at = ?
        WHERE run_id = ?
        "#,
    )
    .bind(state.status.as_str())
    .bind(resolved)
    .bind(playlist)
    .bind(state.playlist.len() as i64)
    .bind(processing_ms as i64)
    .bind(state.error.as_ref().map(|e| e.code.as_str()))
    .bind(completed_at)
    .bind(state.run_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<RunRecord>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, user_id, query, playlist_size, status, resolved_track, playlist,
               track_count, processing_ms, error_code, created_at, completed_at
        FROM playlist_runs
        WHERE run_id = ?
        "#,
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("status");
    let status: PipelineStatus = serde_json::from_value(serde_json::Value::String(status))?;

    let resolved_track: Option<String> = row.get("resolved_track");
    let resolved_track = resolved_track
        .map(|s| serde_json::from_str::<ResolvedTrack>(&s))
        .transpose()?;

    let playlist: Option<String> = row.get("playlist");
    let playlist = playlist
        .map(|s| serde_json::from_str::<Vec<PlaylistTrack>>(&s))
        .transpose()?;

    let created_at: String = row.get("created_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Some(RunRecord {
        run_id,
        user_id: row.get("user_id"),
        query: row.get("query"),
        playlist_size: row.get::<i64, _>("playlist_size") as u32,
        status,
        resolved_track,
        playlist,
        track_count: row.get::<i64, _>("track_count") as usize,
        processing_ms: row.get::<Option<i64>, _>("processing_ms").map(|v| v as u64),
        error_code: row.get("error_code"),
        created_at: parse_timestamp(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    }))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp {}: {}", value, e)))
}
