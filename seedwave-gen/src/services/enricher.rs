//! Track enricher
//!
//! Full enrichment (seed): info+tags, similar tracks, similar artists,
//! fetched concurrently. Light enrichment (candidates): info+tags only.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{dedup_tags, EnrichedTrack, ResolvedTrack};
use crate::services::sources::SimilaritySource;
use crate::services::StageError;

const SIMILAR_TRACKS_LIMIT: usize = 100;
const SIMILAR_ARTISTS_LIMIT: usize = 10;

#[derive(Clone)]
pub struct TrackEnricher {
    similarity: Arc<dyn SimilaritySource>,
}

impl TrackEnricher {
    pub fn new(similarity: Arc<dyn SimilaritySource>) -> Self {
        Self { similarity }
    }

    /// Every failure degrades to an empty field; never fails
    pub async fn enrich(&self, track: ResolvedTrack) -> EnrichedTrack {
        let (info, similar_tracks, similar_artists) = tokio::join!(
            self.similarity.track_info(&track.artist, &track.title),
            self.similarity
                .similar_tracks(&track.artist, &track.title, SIMILAR_TRACKS_LIMIT),
            self.similarity
                .similar_artists(&track.artist, SIMILAR_ARTISTS_LIMIT),
        );

        let mut enriched = EnrichedTrack::bare(track);

        match info {
            Ok(Some(info)) => {
                enriched.tags = dedup_tags(info.tags);
                enriched.listeners = info.summary.listeners;
                enriched.playcount = info.summary.playcount;
                enriched.reported_duration_ms = info.summary.duration_ms;
                enriched.reported_album = info.album;
            }
            Ok(None) => debug!(title = %enriched.track.title, "No track info for seed"),
            Err(e) => warn!(title = %enriched.track.title, error = %e, "Track info unavailable, continuing without tags"),
        }

        match similar_tracks {
            Ok(list) => {
                enriched.similar_track_ids = list.iter().map(|s| s.reference_id()).collect();
            }
            Err(e) => warn!(title = %enriched.track.title, error = %e, "Similar tracks unavailable"),
        }

        match similar_artists {
            Ok(list) => {
                enriched.similar_artists = list.into_iter().map(|a| a.name).collect();
            }
            Err(e) => warn!(artist = %enriched.track.artist, error = %e, "Similar artists unavailable"),
        }

        debug!(
            title = %enriched.track.title,
            tags = enriched.tags.len(),
            similar_tracks = enriched.similar_track_ids.len(),
            similar_artists = enriched.similar_artists.len(),
            "Enriched track"
        );
        enriched
    }

    /// Info and tags only; `Err` means the candidate should be skipped
    pub async fn enrich_light(&self, track: ResolvedTrack) -> Result<EnrichedTrack, StageError> {
        let info = self
            .similarity
            .track_info(&track.artist, &track.title)
            .await?
            .ok_or_else(|| {
                StageError::NotFound(format!("no info for {} - {}", track.artist, track.title))
            })?;

        let mut enriched = EnrichedTrack::bare(track);
        enriched.tags = dedup_tags(info.tags);
        enriched.listeners = info.summary.listeners;
        enriched.playcount = info.summary.playcount;
        enriched.reported_duration_ms = info.summary.duration_ms;
        enriched.reported_album = info.album;
        Ok(enriched)
    }
}
