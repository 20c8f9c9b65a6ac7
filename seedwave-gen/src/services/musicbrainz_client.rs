//! MusicBrainz API client (catalog source)
//!
//! Strict quota: every request acquires from the `musicbrainz` bucket
//! (1 request/second) and carries an identifying User-Agent, as required
//! by the MusicBrainz API terms.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::models::ResolvedTrack;
use crate::services::cache::{self, ResponseCache, LOOKUP_TTL, SEARCH_TTL};
use crate::services::rate_limiter::{RateLimiter, MUSICBRAINZ_API};
use crate::services::sources::{CatalogSource, FetchError, HttpFetcher};
use crate::services::StageError;

const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const DEFAULT_CONTACT: &str = "https://github.com/seedwave/seedwave";
/// Fixed back-off before the single retry after 429/503
const THROTTLE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// MusicBrainz Recording response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBRecording {
    pub id: String,
    pub title: String,
    /// Length in milliseconds
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MBArtistCredit>,
    #[serde(default)]
    pub releases: Option<Vec<MBRelease>>,
    #[serde(rename = "first-release-date", default)]
    pub first_release_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBArtistCredit {
    /// Display name (may differ from artist.name for collaborations)
    pub name: String,
    pub artist: MBArtist,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBRelease {
    pub id: String,
    pub title: String,
    /// YYYY, YYYY-MM, or YYYY-MM-DD
    #[serde(default)]
    pub date: Option<String>,
}

/// `/recording?query=` and `/isrc/{isrc}` responses
#[derive(Debug, Deserialize)]
struct MBRecordingList {
    #[serde(default)]
    recordings: Vec<MBRecording>,
}

impl MBRecording {
    /// Convert to the pipeline's canonical identity
    pub fn to_resolved(&self) -> ResolvedTrack {
        let credit = self.artist_credit.first();
        let release = self.releases.as_ref().and_then(|r| r.first());

        let release_year = self
            .first_release_date
            .as_deref()
            .and_then(parse_year)
            .or_else(|| release.and_then(|r| r.date.as_deref()).and_then(parse_year));

        ResolvedTrack {
            id: self.id.clone(),
            title: self.title.clone(),
            artist: credit.map(|c| c.name.clone()).unwrap_or_default(),
            artist_id: credit.map(|c| c.artist.id.clone()).unwrap_or_default(),
            album: release.map(|r| r.title.clone()),
            album_id: release.map(|r| r.id.clone()),
            release_year,
            duration_ms: self.length,
            url: Some(format!("https://musicbrainz.org/recording/{}", self.id)),
        }
    }
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(..4).and_then(|y| y.parse().ok())
}

/// Escape Lucene special characters inside a quoted term
fn lucene_escape(term: &str) -> String {
    term.replace('\\', "\\\\").replace('"', "\\\"")
}

/// MusicBrainz API client
pub struct MusicBrainzClient {
    fetcher: HttpFetcher,
    cache: Arc<dyn ResponseCache>,
    base_url: String,
}

impl MusicBrainzClient {
    /// Create a client using the shared limiter and cache
    ///
    /// `contact` is appended to the User-Agent (URL or e-mail).
    pub fn new(
        limiter: Arc<RateLimiter>,
        cache: Arc<dyn ResponseCache>,
        contact: Option<&str>,
    ) -> Result<Self, StageError> {
        let user_agent = format!(
            "Seedwave/{} ( {} )",
            env!("CARGO_PKG_VERSION"),
            contact.unwrap_or(DEFAULT_CONTACT)
        );

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StageError::Validation(format!("HTTP client: {}", e)))?;

        Ok(Self {
            fetcher: HttpFetcher::new(http, limiter, MUSICBRAINZ_API, THROTTLE_RETRY_DELAY),
            cache,
            base_url: MUSICBRAINZ_BASE_URL.to_string(),
        })
    }

    async fn fetch_recording_list(
        &self,
        url: String,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<MBRecording>, FetchError> {
        let list: MBRecordingList = self
            .fetcher
            .get_json(|http| http.get(&url).query(&query))
            .await?;
        Ok(list.recordings)
    }
}

#[async_trait]
impl CatalogSource for MusicBrainzClient {
    fn name(&self) -> &str {
        MUSICBRAINZ_API
    }

    async fn search_recordings(
        &self,
        track: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResolvedTrack>, StageError> {
        let key = cache::cache_key(
            MUSICBRAINZ_API,
            "search",
            &[track, artist.unwrap_or(""), &limit.to_string()],
        );
        if let Some(hit) = cache::get_json::<Vec<ResolvedTrack>>(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let lucene = match artist {
            Some(artist) => format!(
                "recording:\"{}\" AND artist:\"{}\"",
                lucene_escape(track),
                lucene_escape(artist)
            ),
            None => format!("recording:\"{}\"", lucene_escape(track)),
        };

        let url = format!("{}/recording", self.base_url);
        let query = vec![
            ("query", lucene),
            ("fmt", "json".to_string()),
            ("limit", limit.to_string()),
        ];

        let recordings = match self.fetch_recording_list(url, query).await {
            Ok(recordings) => recordings,
            Err(e) => return e.into_lenient(MUSICBRAINZ_API, "recording search"),
        };

        let results: Vec<ResolvedTrack> = recordings.iter().map(MBRecording::to_resolved).collect();
        info!(
            track = track,
            artist = artist.unwrap_or(""),
            results = results.len(),
            "MusicBrainz recording search"
        );

        if !results.is_empty() {
            cache::put_json(self.cache.as_ref(), &key, &results, SEARCH_TTL).await;
        }
        Ok(results)
    }

    async fn lookup_recording(&self, id: &str) -> Result<Option<ResolvedTrack>, StageError> {
        let key = cache::cache_key(MUSICBRAINZ_API, "recording", &[id]);
        if let Some(hit) = cache::get_json::<ResolvedTrack>(self.cache.as_ref(), &key).await {
            return Ok(Some(hit));
        }

        // `inc` keeps its literal '+' separators, so it goes in the URL unencoded
        let url = format!(
            "{}/recording/{}?fmt=json&inc=artists+releases",
            self.base_url, id
        );
        let result: Result<MBRecording, FetchError> =
            self.fetcher.get_json(|http| http.get(&url)).await;

        match result {
            Ok(recording) => {
                let resolved = recording.to_resolved();
                cache::put_json(self.cache.as_ref(), &key, &resolved, LOOKUP_TTL).await;
                Ok(Some(resolved))
            }
            Err(e) => e.into_lookup(MUSICBRAINZ_API, "recording lookup"),
        }
    }

    async fn lookup_by_isrc(&self, isrc: &str) -> Result<Option<ResolvedTrack>, StageError> {
        let isrc = isrc.trim().to_uppercase();
        let key = cache::cache_key(MUSICBRAINZ_API, "isrc", &[&isrc]);
        if let Some(hit) = cache::get_json::<ResolvedTrack>(self.cache.as_ref(), &key).await {
            return Ok(Some(hit));
        }

        let url = format!(
            "{}/isrc/{}?fmt=json&inc=artists+releases",
            self.base_url, isrc
        );

        match self.fetch_recording_list(url, Vec::new()).await {
            Ok(recordings) => {
                let resolved = recordings.first().map(MBRecording::to_resolved);
                if let Some(track) = &resolved {
                    cache::put_json(self.cache.as_ref(), &key, track, LOOKUP_TTL).await;
                }
                Ok(resolved)
            }
            Err(e) => e.into_lookup(MUSICBRAINZ_API, "isrc lookup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryResponseCache;

    const SEARCH_FIXTURE: &str = r#"{
        "created": "2024-01-01T00:00:00.000Z",
        "count": 1,
        "offset": 0,
        "recordings": [{
            "id": "a4e4bd5c-7e8b-4b49-a4a3-b1e1a8a8c3f1",
            "score": 100,
            "title": "Paranoid Android",
            "length": 387000,
            "first-release-date": "1997-05-26",
            "artist-credit": [{
                "name": "Radiohead",
                "artist": {"id": "a74b1b7f-71a5-4011-9441-d0b5e4122711", "name": "Radiohead", "sort-name": "Radiohead"}
            }],
            "releases": [{"id": "rel-1", "title": "OK Computer", "date": "1997-06-16"}]
        }]
    }"#;

    fn test_client(cache: Arc<dyn ResponseCache>) -> MusicBrainzClient {
        MusicBrainzClient::new(Arc::new(RateLimiter::with_defaults()), cache, None).unwrap()
    }

    #[test]
    fn test_parse_search_fixture() {
        let list: MBRecordingList = serde_json::from_str(SEARCH_FIXTURE).unwrap();
        assert_eq!(list.recordings.len(), 1);

        let resolved = list.recordings[0].to_resolved();
        assert_eq!(resolved.title, "Paranoid Android");
        assert_eq!(resolved.artist, "Radiohead");
        assert_eq!(resolved.artist_id, "a74b1b7f-71a5-4011-9441-d0b5e4122711");
        assert_eq!(resolved.album.as_deref(), Some("OK Computer"));
        assert_eq!(resolved.release_year, Some(1997));
        assert_eq!(resolved.duration_ms, Some(387000));
        assert!(resolved.url.unwrap().ends_with(&resolved.id));
    }

    #[test]
    fn test_release_date_fallback_and_missing_credit() {
        let recording: MBRecording = serde_json::from_str(
            r#"{"id": "x", "title": "Untitled", "releases": [{"id": "r", "title": "R", "date": "2003"}]}"#,
        )
        .unwrap();
        let resolved = recording.to_resolved();
        assert_eq!(resolved.release_year, Some(2003));
        assert_eq!(resolved.artist, "");
        assert_eq!(resolved.duration_ms, None);
    }

    #[test]
    fn test_lucene_escape() {
        assert_eq!(lucene_escape(r#"Say "Hello""#), r#"Say \"Hello\""#);
    }

    #[tokio::test]
    async fn test_search_served_from_cache() {
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryResponseCache::new());
        let cached = vec![ResolvedTrack::named("Paranoid Android", "Radiohead")];
        let key = cache::cache_key(
            MUSICBRAINZ_API,
            "search",
            &["Paranoid Android", "Radiohead", "10"],
        );
        cache::put_json(cache.as_ref(), &key, &cached, SEARCH_TTL).await;

        let client = test_client(Arc::clone(&cache));
        let results = client
            .search_recordings("paranoid android", Some("RADIOHEAD"), 10)
            .await
            .unwrap();
        assert_eq!(results, cached);
    }

    #[tokio::test]
    async fn test_lookup_served_from_cache() {
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryResponseCache::new());
        let mut cached = ResolvedTrack::named("Roads", "Portishead");
        cached.id = "rec-roads".to_string();
        let key = cache::cache_key(MUSICBRAINZ_API, "recording", &["rec-roads"]);
        cache::put_json(cache.as_ref(), &key, &cached, LOOKUP_TTL).await;

        let client = test_client(cache);
        assert_eq!(client.lookup_recording("rec-roads").await.unwrap(), Some(cached));
    }
}
