//! Status access log
//!
//! Written from detached tasks; a failed write never affects the read it
//! records.

use chrono::Utc;
use seedwave_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn record_access(pool: &SqlitePool, run_id: Uuid, via: &str) -> Result<()> {
    sqlx::query("INSERT INTO run_access_log (run_id, accessed_at, via) VALUES (?, ?, ?)")
        .bind(run_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(via)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_accesses(pool: &SqlitePool, run_id: Uuid) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM run_access_log WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count as u64)
}

/// Record an access without waiting for the write
pub fn record_access_detached(pool: SqlitePool, run_id: Uuid, via: &'static str) {
    tokio::spawn(async move {
        if let Err(e) = record_access(&pool, run_id, via).await {
            tracing::warn!(run_id = %run_id, via = via, error = %e, "Failed to record status access");
        }
    });
}
