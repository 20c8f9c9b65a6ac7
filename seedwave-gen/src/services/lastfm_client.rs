//! Last.fm API client (similarity source)
//!
//! Lenient quota: 5 requests/second through the `lastfm` bucket. Last.fm
//! reports numbers as strings in most endpoints and collapses single-item
//! lists into bare objects; the response types below accept both shapes.

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{dedup_tags, Tag, TagSource};
use crate::services::cache::{self, ResponseCache, SEARCH_TTL, SIMILARITY_TTL, TRACK_INFO_TTL};
use crate::services::rate_limiter::{RateLimiter, LASTFM_API};
use crate::services::sources::{
    FetchError, HttpFetcher, SimilarArtist, SimilaritySource, TrackInfo, TrackSummary,
};
use crate::services::StageError;

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const THROTTLE_RETRY_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Lenient response primitives
// ============================================================================

/// A list that Last.fm may serialize as a single object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn list<T>(value: Option<OneOrMany<T>>) -> Vec<T> {
    value.map(OneOrMany::into_vec).unwrap_or_default()
}

/// Accept `"123"`, `123`, `""`, or absent
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Artist is a bare string in search results and an object elsewhere
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LfmArtistRef {
    Name(String),
    Object {
        #[serde(alias = "#text")]
        name: String,
        #[serde(default)]
        mbid: Option<String>,
    },
}

impl LfmArtistRef {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            LfmArtistRef::Name(name) => (name, None),
            LfmArtistRef::Object { name, mbid } => (name, non_empty(mbid)),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct LfmTrack {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    artist: LfmArtistRef,
    /// Seconds in list endpoints
    #[serde(default, deserialize_with = "lenient_u64")]
    duration: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    playcount: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
}

impl LfmTrack {
    fn into_summary(self) -> TrackSummary {
        let (artist, artist_mbid) = self.artist.into_parts();
        TrackSummary {
            mbid: non_empty(self.mbid),
            title: self.name,
            artist,
            artist_mbid,
            duration_ms: self.duration.filter(|d| *d > 0).map(|secs| secs * 1000),
            playcount: self.playcount,
            listeners: self.listeners,
            url: self.url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LfmTag {
    name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    count: Option<u64>,
}

// ============================================================================
// Endpoint envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Option<SearchResults>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    trackmatches: Option<TrackMatches>,
}

#[derive(Debug, Deserialize)]
struct TrackMatches {
    track: Option<OneOrMany<LfmTrack>>,
}

#[derive(Debug, Deserialize)]
struct TrackInfoResponse {
    track: Option<LfmTrackInfo>,
}

#[derive(Debug, Deserialize)]
struct LfmTrackInfo {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    artist: LfmArtistRef,
    /// Milliseconds in track.getInfo
    #[serde(default, deserialize_with = "lenient_u64")]
    duration: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    playcount: Option<u64>,
    #[serde(default)]
    album: Option<LfmAlbum>,
    #[serde(default)]
    toptags: Option<TagList>,
}

#[derive(Debug, Deserialize)]
struct LfmAlbum {
    title: String,
    #[serde(default)]
    mbid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    tag: Option<OneOrMany<LfmTag>>,
}

#[derive(Debug, Deserialize)]
struct TopTagsResponse {
    toptags: Option<TagList>,
}

#[derive(Debug, Deserialize)]
struct SimilarTracksResponse {
    similartracks: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    track: Option<OneOrMany<LfmTrack>>,
}

#[derive(Debug, Deserialize)]
struct SimilarArtistsResponse {
    similarartists: Option<ArtistList>,
}

#[derive(Debug, Deserialize)]
struct ArtistList {
    artist: Option<OneOrMany<LfmSimilarArtist>>,
}

#[derive(Debug, Deserialize)]
struct LfmSimilarArtist {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(rename = "match", default, deserialize_with = "lenient_f64")]
    match_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ArtistTopTracksResponse {
    toptracks: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
struct TagTopTracksResponse {
    tracks: Option<TrackList>,
}

fn convert_tags(tags: Vec<LfmTag>) -> Vec<Tag> {
    dedup_tags(
        tags.into_iter()
            .map(|t| {
                let count = t.count.unwrap_or(1).min(u32::MAX as u64) as u32;
                Tag::new(t.name, count, TagSource::Lastfm)
            })
            .collect(),
    )
}

fn summaries(tracks: Option<TrackList>) -> Vec<TrackSummary> {
    list(tracks.and_then(|t| t.track))
        .into_iter()
        .map(LfmTrack::into_summary)
        .collect()
}

// ============================================================================
// Client
// ============================================================================

/// Last.fm API client
pub struct LastFmClient {
    fetcher: HttpFetcher,
    cache: Arc<dyn ResponseCache>,
    api_key: String,
    base_url: String,
}

impl LastFmClient {
    /// An empty `api_key` disables network access; every call returns empty
    pub fn new(
        api_key: impl Into<String>,
        limiter: Arc<RateLimiter>,
        cache: Arc<dyn ResponseCache>,
    ) -> Result<Self, StageError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("Seedwave/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StageError::Validation(format!("HTTP client: {}", e)))?;

        Ok(Self {
            fetcher: HttpFetcher::new(http, limiter, LASTFM_API, THROTTLE_RETRY_DELAY),
            cache,
            api_key: api_key.into(),
            base_url: LASTFM_API_BASE.to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Call one API method; `None` means "treat as not found"
    async fn call<T>(&self, method: &str, params: &[(&str, String)]) -> Result<Option<T>, StageError>
    where
        T: de::DeserializeOwned,
    {
        if !self.is_configured() {
            debug!(method = method, "Last.fm API key not configured, skipping call");
            return Ok(None);
        }

        let mut query: Vec<(&str, String)> = vec![
            ("method", method.to_string()),
            ("api_key", self.api_key.clone()),
            ("format", "json".to_string()),
        ];
        query.extend(params.iter().cloned());

        let result: Result<T, FetchError> = self
            .fetcher
            .get_json(|http| http.get(&self.base_url).query(&query))
            .await;

        match result {
            Ok(body) => Ok(Some(body)),
            Err(e) => e.into_lenient(LASTFM_API, method),
        }
    }

    async fn top_tags(&self, artist: &str, title: &str) -> Result<Vec<Tag>, StageError> {
        let response: Option<TopTagsResponse> = self
            .call(
                "track.getTopTags",
                &[
                    ("artist", artist.to_string()),
                    ("track", title.to_string()),
                    ("autocorrect", "1".to_string()),
                ],
            )
            .await?;

        Ok(convert_tags(list(
            response.and_then(|r| r.toptags).and_then(|t| t.tag),
        )))
    }
}

#[async_trait]
impl SimilaritySource for LastFmClient {
    fn name(&self) -> &str {
        LASTFM_API
    }

    async fn search_tracks(
        &self,
        track: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        let key = cache::cache_key(
            LASTFM_API,
            "track.search",
            &[track, artist.unwrap_or(""), &limit.to_string()],
        );
        if let Some(hit) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let mut params = vec![("track", track.to_string()), ("limit", limit.to_string())];
        if let Some(artist) = artist {
            params.push(("artist", artist.to_string()));
        }

        let response: Option<SearchResponse> = self.call("track.search", &params).await?;
        let results: Vec<TrackSummary> = list(
            response
                .and_then(|r| r.results)
                .and_then(|r| r.trackmatches)
                .and_then(|m| m.track),
        )
        .into_iter()
        .map(LfmTrack::into_summary)
        .collect();

        debug!(track = track, results = results.len(), "Last.fm track search");
        if !results.is_empty() {
            cache::put_json(self.cache.as_ref(), &key, &results, SEARCH_TTL).await;
        }
        Ok(results)
    }

    async fn track_info(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Option<TrackInfo>, StageError> {
        let key = cache::cache_key(LASTFM_API, "track.getInfo", &[artist, title]);
        if let Some(hit) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(Some(hit));
        }

        let response: Option<TrackInfoResponse> = self
            .call(
                "track.getInfo",
                &[
                    ("artist", artist.to_string()),
                    ("track", title.to_string()),
                    ("autocorrect", "1".to_string()),
                ],
            )
            .await?;

        let Some(info) = response.and_then(|r| r.track) else {
            return Ok(None);
        };

        // getInfo tags carry no counts; prefer the weighted top-tags list
        let mut tags = self.top_tags(artist, title).await?;
        if tags.is_empty() {
            tags = convert_tags(list(info.toptags.and_then(|t| t.tag)));
        }

        let (artist_name, artist_mbid) = info.artist.into_parts();
        let (album, album_mbid) = match info.album {
            Some(album) => (Some(album.title), non_empty(album.mbid)),
            None => (None, None),
        };

        let track_info = TrackInfo {
            summary: TrackSummary {
                mbid: non_empty(info.mbid),
                title: info.name,
                artist: artist_name,
                artist_mbid,
                duration_ms: info.duration.filter(|d| *d > 0),
                playcount: info.playcount,
                listeners: info.listeners,
                url: info.url,
            },
            album,
            album_mbid,
            tags,
        };

        cache::put_json(self.cache.as_ref(), &key, &track_info, TRACK_INFO_TTL).await;
        Ok(Some(track_info))
    }

    async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        let key = cache::cache_key(
            LASTFM_API,
            "track.getSimilar",
            &[artist, title, &limit.to_string()],
        );
        if let Some(hit) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let response: Option<SimilarTracksResponse> = self
            .call(
                "track.getSimilar",
                &[
                    ("artist", artist.to_string()),
                    ("track", title.to_string()),
                    ("limit", limit.to_string()),
                    ("autocorrect", "1".to_string()),
                ],
            )
            .await?;

        let results = summaries(response.and_then(|r| r.similartracks));
        info!(artist = artist, title = title, results = results.len(), "Last.fm similar tracks");
        if !results.is_empty() {
            cache::put_json(self.cache.as_ref(), &key, &results, SIMILARITY_TTL).await;
        }
        Ok(results)
    }

    async fn similar_artists(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<SimilarArtist>, StageError> {
        let key = cache::cache_key(
            LASTFM_API,
            "artist.getSimilar",
            &[artist, &limit.to_string()],
        );
        if let Some(hit) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let response: Option<SimilarArtistsResponse> = self
            .call(
                "artist.getSimilar",
                &[
                    ("artist", artist.to_string()),
                    ("limit", limit.to_string()),
                    ("autocorrect", "1".to_string()),
                ],
            )
            .await?;

        let results: Vec<SimilarArtist> = list(response.and_then(|r| r.similarartists).and_then(|a| a.artist))
            .into_iter()
            .map(|a| SimilarArtist {
                name: a.name,
                mbid: non_empty(a.mbid),
                score: a.match_score.unwrap_or(0.0).clamp(0.0, 1.0),
            })
            .collect();

        if !results.is_empty() {
            cache::put_json(self.cache.as_ref(), &key, &results, SIMILARITY_TTL).await;
        }
        Ok(results)
    }

    async fn artist_top_tracks(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        let key = cache::cache_key(
            LASTFM_API,
            "artist.getTopTracks",
            &[artist, &limit.to_string()],
        );
        if let Some(hit) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let response: Option<ArtistTopTracksResponse> = self
            .call(
                "artist.getTopTracks",
                &[
                    ("artist", artist.to_string()),
                    ("limit", limit.to_string()),
                    ("autocorrect", "1".to_string()),
                ],
            )
            .await?;

        let results = summaries(response.and_then(|r| r.toptracks));
        if !results.is_empty() {
            cache::put_json(self.cache.as_ref(), &key, &results, SIMILARITY_TTL).await;
        }
        Ok(results)
    }

    async fn tag_top_tracks(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        let key = cache::cache_key(LASTFM_API, "tag.getTopTracks", &[tag, &limit.to_string()]);
        if let Some(hit) = cache::get_json(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let response: Option<TagTopTracksResponse> = self
            .call(
                "tag.getTopTracks",
                &[("tag", tag.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        let results = summaries(response.and_then(|r| r.tracks));
        if !results.is_empty() {
            cache::put_json(self.cache.as_ref(), &key, &results, SIMILARITY_TTL).await;
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryResponseCache;

    #[test]
    fn test_parse_similar_tracks_with_numeric_and_string_fields() {
        let body = r#"{
            "similartracks": {
                "track": [
                    {"name": "Karma Police", "playcount": 2481923, "mbid": "", "match": 1.0,
                     "url": "https://www.last.fm/music/Radiohead/_/Karma+Police", "duration": 264,
                     "artist": {"name": "Radiohead", "mbid": "a74b1b7f-71a5-4011-9441-d0b5e4122711"}},
                    {"name": "Exit Music", "playcount": "812345", "match": "0.8",
                     "artist": {"name": "Radiohead"}}
                ],
                "@attr": {"artist": "Radiohead"}
            }
        }"#;

        let response: SimilarTracksResponse = serde_json::from_str(body).unwrap();
        let results = summaries(response.similartracks);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Karma Police");
        assert_eq!(results[0].mbid, None);
        assert_eq!(results[0].playcount, Some(2_481_923));
        assert_eq!(results[0].duration_ms, Some(264_000));
        assert_eq!(
            results[0].artist_mbid.as_deref(),
            Some("a74b1b7f-71a5-4011-9441-d0b5e4122711")
        );
        assert_eq!(results[1].playcount, Some(812_345));
    }

    #[test]
    fn test_single_item_list_and_search_artist_string() {
        let body = r#"{
            "results": {
                "trackmatches": {
                    "track": {"name": "Teardrop", "artist": "Massive Attack", "listeners": "1200000", "mbid": "tear-1"}
                }
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let tracks = list(response.results.and_then(|r| r.trackmatches).and_then(|m| m.track));
        assert_eq!(tracks.len(), 1);

        let summary = tracks.into_iter().next().unwrap().into_summary();
        assert_eq!(summary.artist, "Massive Attack");
        assert_eq!(summary.listeners, Some(1_200_000));
        assert_eq!(summary.mbid.as_deref(), Some("tear-1"));
    }

    #[test]
    fn test_error_payload_yields_empty() {
        // Last.fm reports "not found" with HTTP 200 and an error body
        let body = r#"{"error": 6, "message": "Track not found", "links": []}"#;
        let response: SimilarTracksResponse = serde_json::from_str(body).unwrap();
        assert!(summaries(response.similartracks).is_empty());
    }

    #[test]
    fn test_track_info_and_tags() {
        let body = r#"{
            "track": {
                "name": "Paranoid Android", "mbid": "", "url": "https://www.last.fm/x",
                "duration": "387000", "listeners": "1500000", "playcount": "14000000",
                "artist": {"name": "Radiohead", "mbid": "a74b"},
                "album": {"artist": "Radiohead", "title": "OK Computer", "mbid": "okc"},
                "toptags": {"tag": [{"name": "alternative", "url": "x"}, {"name": "Alternative", "url": "y"}]}
            }
        }"#;
        let response: TrackInfoResponse = serde_json::from_str(body).unwrap();
        let info = response.track.unwrap();
        assert_eq!(info.duration, Some(387_000));
        assert_eq!(info.playcount, Some(14_000_000));
        assert_eq!(info.album.as_ref().unwrap().title, "OK Computer");

        let tags = convert_tags(list(info.toptags.and_then(|t| t.tag)));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].count, 1);

        let top: TopTagsResponse = serde_json::from_str(
            r#"{"toptags": {"tag": [{"name": "alternative", "count": 100}, {"name": "rock", "count": "71"}]}}"#,
        )
        .unwrap();
        let tags = convert_tags(list(top.toptags.and_then(|t| t.tag)));
        assert_eq!(tags[0].count, 100);
        assert_eq!(tags[1].count, 71);
        assert_eq!(tags[1].source, TagSource::Lastfm);
    }

    #[test]
    fn test_similar_artist_match_score() {
        let body = r#"{"similarartists": {"artist": [
            {"name": "Thom Yorke", "mbid": "8ed2e0b3", "match": "1"},
            {"name": "Muse", "match": "0.42"}
        ]}}"#;
        let response: SimilarArtistsResponse = serde_json::from_str(body).unwrap();
        let artists = list(response.similarartists.and_then(|a| a.artist));
        assert_eq!(artists.len(), 2);
        assert_eq!(artists[0].match_score, Some(1.0));
        assert_eq!(artists[1].match_score, Some(0.42));
        assert!(artists[1].mbid.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_client_returns_empty() {
        let client = LastFmClient::new(
            "",
            Arc::new(RateLimiter::with_defaults()),
            Arc::new(MemoryResponseCache::new()),
        )
        .unwrap();

        assert!(!client.is_configured());
        assert!(client.similar_tracks("Radiohead", "Creep", 100).await.unwrap().is_empty());
        assert!(client.track_info("Radiohead", "Creep").await.unwrap().is_none());
        assert!(client.similar_artists("Radiohead", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cached_similar_tracks_skip_network() {
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryResponseCache::new());
        let cached = vec![TrackSummary::named("Lucky", "Radiohead")];
        let key = cache::cache_key(LASTFM_API, "track.getSimilar", &["Radiohead", "Airbag", "100"]);
        cache::put_json(cache.as_ref(), &key, &cached, SIMILARITY_TTL).await;

        let client = LastFmClient::new("key", Arc::new(RateLimiter::with_defaults()), cache).unwrap();
        let results = client.similar_tracks("radiohead", "airbag", 100).await.unwrap();
        assert_eq!(results, cached);
    }
}
