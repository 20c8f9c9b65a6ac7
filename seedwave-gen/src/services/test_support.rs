//! In-crate source stubs for stage unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::models::{ResolvedTrack, Tag, TagSource};
use crate::services::sources::{
    CatalogSource, SimilarArtist, SimilaritySource, TrackInfo, TrackSummary,
};
use crate::services::StageError;

pub fn summary(title: &str, id: &str) -> TrackSummary {
    let mut s = TrackSummary::named(title, "Various");
    if !id.is_empty() {
        s.mbid = Some(id.to_string());
    }
    s
}

/// Similarity source answering from fixed lists and recording every call
#[derive(Default)]
pub struct ListSource {
    pub similar: Vec<TrackSummary>,
    pub artist_top: HashMap<String, Vec<TrackSummary>>,
    pub tag_top: Vec<TrackSummary>,
    /// Titles `track_info` knows nothing about
    pub unknown: HashSet<String>,
    pub info_duration_ms: Option<u64>,
    pub info_album: Option<String>,
    /// Fired after `similar_tracks` answers
    pub cancel_after_similar: Option<CancellationToken>,
    pub calls: Mutex<Vec<String>>,
}

impl ListSource {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl SimilaritySource for ListSource {
    fn name(&self) -> &str {
        "list"
    }

    async fn search_tracks(
        &self,
        _track: &str,
        _artist: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        self.record("search");
        Ok(Vec::new())
    }

    async fn track_info(&self, artist: &str, title: &str) -> Result<Option<TrackInfo>, StageError> {
        self.record(format!("info:{}", title));
        if self.unknown.contains(title) {
            return Ok(None);
        }
        let mut s = TrackSummary::named(title, artist);
        s.playcount = Some(250_000);
        s.listeners = Some(25_000);
        s.duration_ms = self.info_duration_ms;
        Ok(Some(TrackInfo {
            summary: s,
            album: self.info_album.clone(),
            album_mbid: None,
            tags: vec![
                Tag::new("Trip-Hop", 60, TagSource::Lastfm),
                Tag::new("trip-hop", 90, TagSource::Lastfm),
            ],
        }))
    }

    async fn similar_tracks(
        &self,
        _artist: &str,
        _title: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        self.record("similar");
        if let Some(token) = &self.cancel_after_similar {
            token.cancel();
        }
        Ok(self.similar.iter().take(limit).cloned().collect())
    }

    async fn similar_artists(
        &self,
        _artist: &str,
        _limit: usize,
    ) -> Result<Vec<SimilarArtist>, StageError> {
        self.record("similar_artists");
        Ok(Vec::new())
    }

    async fn artist_top_tracks(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<TrackSummary>, StageError> {
        self.record(format!("artist_top:{}", artist));
        Ok(self
            .artist_top
            .get(artist)
            .map(|tracks| tracks.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn tag_top_tracks(&self, tag: &str, limit: usize) -> Result<Vec<TrackSummary>, StageError> {
        self.record(format!("tag_top:{}", tag));
        Ok(self.tag_top.iter().take(limit).cloned().collect())
    }
}

/// Catalog with nothing in it
pub struct EmptyCatalog;

#[async_trait]
impl CatalogSource for EmptyCatalog {
    fn name(&self) -> &str {
        "empty"
    }

    async fn search_recordings(
        &self,
        _track: &str,
        _artist: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<ResolvedTrack>, StageError> {
        Ok(Vec::new())
    }

    async fn lookup_recording(&self, _id: &str) -> Result<Option<ResolvedTrack>, StageError> {
        Ok(None)
    }

    async fn lookup_by_isrc(&self, _isrc: &str) -> Result<Option<ResolvedTrack>, StageError> {
        Ok(None)
    }
}
