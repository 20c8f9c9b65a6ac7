//! Metadata source capabilities
//!
//! The stages depend on these traits rather than on the concrete HTTP
//! adapters, so tests can substitute deterministic stubs.
//!
//! Error contract shared by every implementation: throttling that outlasts
//! the adapter's single retry is `RateLimited`; any other failure of a
//! search/list call reads as "nothing found" (`Ok(None)` / empty). Only
//! lookup-by-id may surface `UpstreamUnavailable`.

use crate::models::{ResolvedTrack, Tag};
use crate::services::rate_limiter::RateLimiter;
use crate::services::StageError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Catalog source (strict quota): authoritative recording identities
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn name(&self) -> &str;

    /// Search recordings by title, optionally narrowed by artist
    async fn search_recordings(
        &self,
        track: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResolvedTrack>, StageError>;

    /// Look up one recording by catalog id
    async fn lookup_recording(&self, id: &str) -> Result<Option<ResolvedTrack>, StageError>;

    /// Look up a recording by ISRC
    async fn lookup_by_isrc(&self, isrc: &str) -> Result<Option<ResolvedTrack>, StageError>;
}

/// Similarity source (lenient quota): tags, listening stats, similarity lists
#[async_trait]
pub trait SimilaritySource: Send + Sync {
    fn name(&self) -> &str;

    async fn search_tracks(
        &self,
        track: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError>;

    /// Tags, listeners, playcount, duration, album
    async fn track_info(&self, artist: &str, title: &str)
        -> Result<Option<TrackInfo>, StageError>;

    async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError>;

    async fn similar_artists(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<SimilarArtist>, StageError>;

    async fn artist_top_tracks(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError>;

    async fn tag_top_tracks(&self, tag: &str, limit: usize)
        -> Result<Vec<TrackSummary>, StageError>;
}

/// Track entry from a similarity-source list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    /// Recording MBID when the source knows it
    pub mbid: Option<String>,
    pub title: String,
    pub artist: String,
    pub artist_mbid: Option<String>,
    pub duration_ms: Option<u64>,
    pub playcount: Option<u64>,
    pub listeners: Option<u64>,
    pub url: Option<String>,
}

impl TrackSummary {
    pub fn named(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            mbid: None,
            title: title.into(),
            artist: artist.into(),
            artist_mbid: None,
            duration_ms: None,
            playcount: None,
            listeners: None,
            url: None,
        }
    }

    /// Identifier stored in similar-track lists: MBID, else "artist - title"
    pub fn reference_id(&self) -> String {
        match self.mbid.as_deref().map(str::trim) {
            Some(mbid) if !mbid.is_empty() => mbid.to_string(),
            _ => format!("{} - {}", self.artist, self.title).to_lowercase(),
        }
    }

    pub fn to_resolved(&self) -> ResolvedTrack {
        ResolvedTrack {
            id: self.mbid.clone().unwrap_or_default(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artist_id: self.artist_mbid.clone().unwrap_or_default(),
            album: None,
            album_id: None,
            release_year: None,
            duration_ms: self.duration_ms,
            url: self.url.clone(),
        }
    }
}

/// Detailed track info from the similarity source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub summary: TrackSummary,
    pub album: Option<String>,
    pub album_mbid: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarArtist {
    pub name: String,
    pub mbid: Option<String>,
    /// Source match score in [0, 1]
    pub score: f64,
}

/// Low-level HTTP failure before mapping to the stage taxonomy
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("throttled (HTTP {0}) after retry")]
    Throttled(u16),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Mapping for search/list calls: only throttling surfaces
    pub fn into_lenient<T: Default>(self, source: &str, operation: &str) -> Result<T, StageError> {
        match self {
            FetchError::Throttled(_) => Err(StageError::RateLimited(source.to_string())),
            other => {
                warn!(
                    source = source,
                    operation = operation,
                    error = %other,
                    "Source call failed, treating as not found"
                );
                Ok(T::default())
            }
        }
    }

    /// Mapping for lookup-by-id calls: 404 is "not found", transport failures are retryable
    pub fn into_lookup<T>(self, source: &str, operation: &str) -> Result<Option<T>, StageError> {
        match self {
            FetchError::Throttled(_) => Err(StageError::RateLimited(source.to_string())),
            FetchError::Status(404) | FetchError::Status(400) => Ok(None),
            FetchError::Parse(msg) => {
                warn!(source = source, operation = operation, error = %msg, "Unparseable lookup response");
                Ok(None)
            }
            FetchError::Status(code) => Err(StageError::UpstreamUnavailable(format!(
                "{} {} returned HTTP {}",
                source, operation, code
            ))),
            FetchError::Network(msg) => Err(StageError::UpstreamUnavailable(format!(
                "{} {}: {}",
                source, operation, msg
            ))),
        }
    }
}

/// Rate-limited JSON GETs with one throttling retry
pub struct HttpFetcher {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    api: &'static str,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(
        http: reqwest::Client,
        limiter: Arc<RateLimiter>,
        api: &'static str,
        retry_delay: Duration,
    ) -> Self {
        Self {
            http,
            limiter,
            api,
            retry_delay,
        }
    }

    pub fn api(&self) -> &'static str {
        self.api
    }

    /// Acquire from the API's bucket, send, and decode the body
    ///
    /// HTTP 429 and 503 are retried once after `retry_delay`.
    pub async fn get_json<T, F>(&self, build: F) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut retried = false;
        loop {
            self.limiter.until_ready(self.api).await;

            let response = build(&self.http)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 || status.as_u16() == 503 {
                if retried {
                    return Err(FetchError::Throttled(status.as_u16()));
                }
                retried = true;
                warn!(
                    api = self.api,
                    status = status.as_u16(),
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "Upstream throttled request, retrying once"
                );
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            debug!(api = self.api, status = status.as_u16(), "Source response received");
            return response
                .json::<T>()
                .await
                .map_err(|e| FetchError::Parse(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_id_prefers_mbid() {
        let mut summary = TrackSummary::named("Angel", "Massive Attack");
        assert_eq!(summary.reference_id(), "massive attack - angel");

        summary.mbid = Some("  ".to_string());
        assert_eq!(summary.reference_id(), "massive attack - angel");

        summary.mbid = Some("abc-123".to_string());
        assert_eq!(summary.reference_id(), "abc-123");
    }

    #[test]
    fn test_to_resolved_carries_identity() {
        let mut summary = TrackSummary::named("Angel", "Massive Attack");
        summary.duration_ms = Some(379_000);
        summary.artist_mbid = Some("artist-1".to_string());

        let resolved = summary.to_resolved();
        assert_eq!(resolved.id, "");
        assert_eq!(resolved.artist_id, "artist-1");
        assert_eq!(resolved.duration_ms, Some(379_000));
        assert_eq!(resolved.canonical_key(), "title:angel");
    }

    #[test]
    fn test_lenient_mapping() {
        let empty: Vec<TrackSummary> = FetchError::Status(500)
            .into_lenient("lastfm", "track.search")
            .unwrap();
        assert!(empty.is_empty());

        let none: Option<TrackInfo> = FetchError::Network("reset".into())
            .into_lenient("lastfm", "track.getInfo")
            .unwrap();
        assert!(none.is_none());

        let throttled: Result<Vec<TrackSummary>, _> =
            FetchError::Throttled(429).into_lenient("lastfm", "track.search");
        assert_eq!(throttled, Err(StageError::RateLimited("lastfm".to_string())));
    }

    #[test]
    fn test_lookup_mapping() {
        let missing: Option<ResolvedTrack> = FetchError::Status(404)
            .into_lookup("musicbrainz", "recording")
            .unwrap();
        assert!(missing.is_none());

        let err = FetchError::Status(502)
            .into_lookup::<ResolvedTrack>("musicbrainz", "recording")
            .unwrap_err();
        assert!(matches!(err, StageError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());

        let err = FetchError::Network("timed out".into())
            .into_lookup::<ResolvedTrack>("musicbrainz", "recording")
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
