//! Configuration resolution for seedwave-gen
//!
//! Multi-tier resolution with Database → ENV → TOML priority.

use seedwave_common::config::TomlConfig;
use seedwave_common::Result;
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::{info, warn};

use crate::services::PipelineSettings;

/// Environment variable holding the Last.fm API key
pub const LASTFM_API_KEY_ENV: &str = "SEEDWAVE_LASTFM_API_KEY";

/// Resolve the Last.fm API key
///
/// **Priority:** Database → ENV → TOML
///
/// `None` when no source holds a usable key; the Last.fm adapter then
/// answers every call with empty results.
pub async fn resolve_lastfm_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_lastfm_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(LASTFM_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .lastfm_api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Last.fm API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(source) = sources.first() {
        info!("Last.fm API key loaded from {}", source);
    } else {
        warn!(
            "Last.fm API key not configured; set {} or lastfm_api_key in the TOML config",
            LASTFM_API_KEY_ENV
        );
    }

    Ok(db_key.or(env_key).or(toml_key))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Pipeline settings from the `[pipeline]` TOML table
pub fn pipeline_settings(toml_config: &TomlConfig) -> PipelineSettings {
    PipelineSettings {
        stage_timeout: Duration::from_secs(toml_config.pipeline.stage_timeout_secs.max(1)),
        status_interval: Duration::from_millis(toml_config.pipeline.status_interval_ms.max(50)),
    }
}
