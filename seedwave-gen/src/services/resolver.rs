//! Track resolver: free-text query → canonical track
//!
//! Source B (similarity) is searched first only to learn the track's
//! duration; source A (catalog) supplies the identity. A results whose
//! duration is more than [`DURATION_TOLERANCE_MS`] away from every known
//! duration are dropped, unless that would drop all of them.

use std::sync::Arc;
use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use crate::models::ResolvedTrack;
use crate::services::query_parser::{parse_query, ParsedQuery};
use crate::services::sources::{CatalogSource, SimilaritySource, TrackSummary};
use crate::services::StageError;

const SEARCH_LIMIT: usize = 10;
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.8;
const DURATION_TOLERANCE_MS: u64 = 5_000;

pub struct TrackResolver {
    catalog: Arc<dyn CatalogSource>,
    similarity: Arc<dyn SimilaritySource>,
}

impl TrackResolver {
    pub fn new(catalog: Arc<dyn CatalogSource>, similarity: Arc<dyn SimilaritySource>) -> Self {
        Self {
            catalog,
            similarity,
        }
    }

    pub async fn resolve(&self, query: &str) -> Result<ResolvedTrack, StageError> {
        if query.trim().is_empty() {
            return Err(StageError::Validation("query must not be empty".to_string()));
        }

        let parsed = parse_query(query);
        debug!(track = %parsed.track, artist = ?parsed.artist, "Parsed seed query");

        // Source B failure is not fatal while source A can still answer
        let (fuzzy_hits, fuzzy_error) = match self
            .similarity
            .search_tracks(&parsed.track, parsed.artist.as_deref(), SEARCH_LIMIT)
            .await
        {
            Ok(hits) => (hits, None),
            Err(e) => {
                warn!(error = %e, "Similarity search failed during resolution");
                (Vec::new(), Some(e))
            }
        };

        let durations = self.known_durations(&parsed, &fuzzy_hits).await;

        let candidates = self
            .catalog
            .search_recordings(&parsed.track, parsed.artist.as_deref(), SEARCH_LIMIT)
            .await?;

        if let Some(track) = pick_catalog_match(candidates, &durations) {
            info!(
                track_id = %track.id,
                title = %track.title,
                artist = %track.artist,
                "Resolved seed track from catalog"
            );
            return Ok(track);
        }

        if let Some(hit) = fuzzy_hits.first() {
            info!(title = %hit.title, artist = %hit.artist, "Resolved seed track from similarity source");
            return Ok(hit.to_resolved());
        }

        match fuzzy_error {
            Some(e) => Err(e),
            None => Err(StageError::NotFound(format!("no track matches \"{}\"", query.trim()))),
        }
    }

    /// Durations of source-B hits whose title matches the parsed track
    async fn known_durations(&self, parsed: &ParsedQuery, hits: &[TrackSummary]) -> Vec<u64> {
        let matching: Vec<&TrackSummary> = hits
            .iter()
            .filter(|hit| titles_match(&parsed.track, &hit.title))
            .collect();

        let durations: Vec<u64> = matching.iter().filter_map(|hit| hit.duration_ms).collect();
        if !durations.is_empty() {
            return durations;
        }

        // Search results often omit duration; ask for the best hit's details
        let Some(best) = matching.first() else {
            return Vec::new();
        };
        match self.similarity.track_info(&best.artist, &best.title).await {
            Ok(Some(info)) => info.summary.duration_ms.into_iter().collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "Duration lookup failed, resolving without durations");
                Vec::new()
            }
        }
    }
}

fn titles_match(wanted: &str, found: &str) -> bool {
    normalized_levenshtein(&wanted.trim().to_lowercase(), &found.trim().to_lowercase())
        >= TITLE_SIMILARITY_THRESHOLD
}

/// First result, preferring results whose duration agrees with a known one
fn pick_catalog_match(candidates: Vec<ResolvedTrack>, durations: &[u64]) -> Option<ResolvedTrack> {
    if durations.is_empty() {
        return candidates.into_iter().next();
    }

    let close = candidates.iter().position(|track| {
        track
            .duration_ms
            .map(|d| durations.iter().any(|known| d.abs_diff(*known) <= DURATION_TOLERANCE_MS))
            .unwrap_or(false)
    });

    match close {
        Some(idx) => candidates.into_iter().nth(idx),
        None => candidates.into_iter().next(),
    }
}
