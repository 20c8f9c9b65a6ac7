//! Response cache shared by the source adapters
//!
//! Keys are built from the logical query (source, operation, normalized
//! arguments), never from the raw URL. The cache is read-through and
//! last-writer-wins; failures are logged and treated as misses.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Track info (tags, playcount)
pub const TRACK_INFO_TTL: Duration = Duration::from_secs(DAY);
/// Similar tracks, similar artists, top tracks
pub const SIMILARITY_TTL: Duration = Duration::from_secs(7 * DAY);
/// Recording and artist lookups by id
pub const LOOKUP_TTL: Duration = Duration::from_secs(30 * DAY);
/// Ad-hoc query resolution (search)
pub const SEARCH_TTL: Duration = Duration::from_secs(7 * DAY);

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Stored value for `key` if present and not expired
    async fn get(&self, key: &str) -> Option<String>;

    async fn put(&self, key: &str, value: &str, ttl: Duration);
}

/// Build a cache key: `source:operation:arg1:arg2`, case-folded and trimmed
pub fn cache_key(source: &str, operation: &str, args: &[&str]) -> String {
    let mut key = format!("{}:{}", source, operation);
    for arg in args {
        key.push(':');
        key.push_str(&arg.trim().to_lowercase());
    }
    key
}

/// Typed read; undecodable entries count as misses
pub async fn get_json<T: DeserializeOwned>(cache: &dyn ResponseCache, key: &str) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => {
            debug!(cache_key = key, "Cache hit");
            Some(value)
        }
        Err(e) => {
            warn!(cache_key = key, error = %e, "Discarding undecodable cache entry");
            None
        }
    }
}

/// Typed write
pub async fn put_json<T: Serialize>(cache: &dyn ResponseCache, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_string(value) {
        Ok(raw) => cache.put(key, &raw, ttl).await,
        Err(e) => warn!(cache_key = key, error = %e, "Failed to serialize cache entry"),
    }
}

/// SQLite-backed cache (`metadata_cache` table)
#[derive(Clone)]
pub struct SqliteResponseCache {
    pool: SqlitePool,
}

impl SqliteResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Remove expired rows, returning how many were deleted
    pub async fn evict_expired(&self) -> seedwave_common::Result<u64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM metadata_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let count = result.rows_affected();
        if count > 0 {
            info!("Evicted {} expired metadata cache entries", count);
        }
        Ok(count)
    }
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Utc::now().timestamp();
        let row: Result<Option<(String,)>, sqlx::Error> = sqlx::query_as(
            "SELECT value FROM metadata_cache WHERE cache_key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(row) => row.map(|(value,)| value),
            Err(e) => {
                warn!(cache_key = key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let now = Utc::now().timestamp();
        let expires_at = now + ttl.as_secs() as i64;

        let result = sqlx::query(
            r#"
            INSERT INTO metadata_cache (cache_key, value, cached_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                value = excluded.value,
                cached_at = excluded.cached_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(cache_key = key, error = %e, "Cache write failed");
        }
    }
}

/// Process-local cache, used in tests and when no database is attached
#[derive(Default)]
pub struct MemoryResponseCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}
