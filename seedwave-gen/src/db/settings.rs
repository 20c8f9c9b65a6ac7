//! Settings database operations (key-value `settings` table)

use seedwave_common::{Error, Result};
use sqlx::{Pool, Sqlite};

pub const LASTFM_API_KEY: &str = "lastfm_api_key";

pub async fn get_lastfm_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, LASTFM_API_KEY).await
}

pub async fn set_lastfm_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, LASTFM_API_KEY, key).await
}

pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_lastfm_key_roundtrip() {
        let pool = test_pool().await;
        assert!(get_lastfm_api_key(&pool).await.unwrap().is_none());

        set_lastfm_api_key(&pool, "abc".to_string()).await.unwrap();
        set_lastfm_api_key(&pool, "def".to_string()).await.unwrap();
        assert_eq!(get_lastfm_api_key(&pool).await.unwrap().as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn test_parse_failure_is_config_error() {
        let pool = test_pool().await;
        set_setting(&pool, "stage_timeout_secs", "soon").await.unwrap();
        let result = get_setting::<u64>(&pool, "stage_timeout_secs").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
