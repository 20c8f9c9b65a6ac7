//! Deterministic stand-ins for the metadata sources and the LLM

use async_trait::async_trait;
use seedwave_gen::models::{ResolvedTrack, Tag, TagSource};
use seedwave_gen::services::llm::{CompletionOptions, LlmError, LlmProvider, Message};
use seedwave_gen::services::sources::{SimilarArtist, TrackInfo, TrackSummary};
use seedwave_gen::services::{CatalogSource, SimilaritySource, StageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub fn track(title: &str, artist: &str, id: &str) -> ResolvedTrack {
    let mut t = ResolvedTrack::named(title, artist);
    t.id = id.to_string();
    t
}

pub fn summary(title: &str, artist: &str, mbid: &str) -> TrackSummary {
    let mut s = TrackSummary::named(title, artist);
    if !mbid.is_empty() {
        s.mbid = Some(mbid.to_string());
    }
    s
}

/// `n` distinct similar tracks spread over five artists
pub fn similar_summaries(n: usize) -> Vec<TrackSummary> {
    (0..n)
        .map(|i| summary(&format!("Similar {}", i), &format!("Artist {}", i % 5), &format!("sim-{}", i)))
        .collect()
}

/// Catalog stub answering searches from a fixed list
#[derive(Default)]
pub struct StubCatalog {
    pub recordings: Vec<ResolvedTrack>,
    /// (track, artist) of every search
    pub searches: Mutex<Vec<(String, Option<String>)>>,
}

impl StubCatalog {
    pub fn with(recordings: Vec<ResolvedTrack>) -> Self {
        Self {
            recordings,
            searches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CatalogSource for StubCatalog {
    fn name(&self) -> &str {
        "stub-catalog"
    }

    async fn search_recordings(
        &self,
        track: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResolvedTrack>, StageError> {
        self.searches
            .lock()
            .unwrap()
            .push((track.to_string(), artist.map(str::to_string)));

        Ok(self
            .recordings
            .iter()
            .filter(|r| r.title.eq_ignore_ascii_case(track))
            .filter(|r| artist.map_or(true, |a| r.artist.eq_ignore_ascii_case(a)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn lookup_recording(&self, id: &str) -> Result<Option<ResolvedTrack>, StageError> {
        Ok(self.recordings.iter().find(|r| r.id == id).cloned())
    }

    async fn lookup_by_isrc(&self, _isrc: &str) -> Result<Option<ResolvedTrack>, StageError> {
        Ok(None)
    }
}

/// Similarity stub
///
/// `track_info` answers from `infos` (keyed by lowercase title), else with a
/// generated deep-cut record tagged "trip-hop" unless `unknown_tracks` is set.
#[derive(Default)]
pub struct StubSimilarity {
    pub search_hits: Vec<TrackSummary>,
    pub infos: HashMap<String, TrackInfo>,
    pub unknown_tracks: bool,
    pub similar: Vec<TrackSummary>,
    pub similar_artists: Vec<SimilarArtist>,
    pub artist_top: HashMap<String, Vec<TrackSummary>>,
    pub tag_top: Vec<TrackSummary>,
    /// Every call fails with this error
    pub fail_with: Option<StageError>,
    /// `artist_top_tracks` waits for a permit
    pub gate: Option<Arc<Semaphore>>,
    pub gate_waiters: AtomicUsize,
    pub info_calls: AtomicUsize,
}

impl StubSimilarity {
    pub fn info(title: &str, artist: &str, playcount: u64, tags: &[(&str, u32)]) -> TrackInfo {
        let mut s = TrackSummary::named(title, artist);
        s.playcount = Some(playcount);
        s.listeners = Some(playcount / 10);
        s.duration_ms = Some(240_000);
        TrackInfo {
            summary: s,
            album: Some("Stub Album".to_string()),
            album_mbid: None,
            tags: tags
                .iter()
                .map(|(name, count)| Tag::new(*name, *count, TagSource::Lastfm))
                .collect(),
        }
    }

    fn check(&self) -> Result<(), StageError> {
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SimilaritySource for StubSimilarity {
    fn name(&self) -> &str {
        "stub-similarity"
    }

    async fn search_tracks(
        &self,
        _track: &str,
        _artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        self.check()?;
        Ok(self.search_hits.iter().take(limit).cloned().collect())
    }

    async fn track_info(&self, artist: &str, title: &str) -> Result<Option<TrackInfo>, StageError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if let Some(info) = self.infos.get(&title.to_lowercase()) {
            return Ok(Some(info.clone()));
        }
        if self.unknown_tracks {
            return Ok(None);
        }
        Ok(Some(Self::info(title, artist, 500_000, &[("trip-hop", 80), ("electronic", 40)])))
    }

    async fn similar_tracks(
        &self,
        _artist: &str,
        _title: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        self.check()?;
        Ok(self.similar.iter().take(limit).cloned().collect())
    }

    async fn similar_artists(
        &self,
        _artist: &str,
        limit: usize,
    ) -> Result<Vec<SimilarArtist>, StageError> {
        self.check()?;
        Ok(self.similar_artists.iter().take(limit).cloned().collect())
    }

    async fn artist_top_tracks(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        self.check()?;
        if let Some(gate) = &self.gate {
            self.gate_waiters.fetch_add(1, Ordering::SeqCst);
            let _permit = gate.acquire().await.expect("gate open");
        }
        Ok(self
            .artist_top
            .get(artist)
            .map(|tracks| tracks.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn tag_top_tracks(&self, _tag: &str, limit: usize) -> Result<Vec<TrackSummary>, StageError> {
        self.check()?;
        Ok(self.tag_top.iter().take(limit).cloned().collect())
    }
}

/// LLM stub: a fixed reply, or a connection failure when `reply` is `None`
pub struct StubLlm {
    pub reply: Option<String>,
    pub calls: AtomicUsize,
}

impl StubLlm {
    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(LlmError::Connection("connection refused".to_string())),
        }
    }
}
