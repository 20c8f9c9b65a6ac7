//! Candidate pool discovery
//!
//! Strategies run in a fixed order until the pool is full:
//! 1. Similar tracks of the seed
//! 2. Top tracks of the seed's similar artists
//! 3. Top tracks of the seed's highest-count tag
//! 4. Nearest neighbours in the vector index (when configured)
//!
//! The returned pool is `[seed, candidates...]` and never holds more than
//! `target_size × POOL_MULTIPLIER` entries. Similar tracks are deduplicated
//! over everything fetched before the first `SIMILAR_TRACKS_TAKEN` new ones
//! are kept.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{title_key, EnrichedTrack, ResolvedTrack};
use crate::services::enricher::TrackEnricher;
use crate::services::sources::{CatalogSource, SimilaritySource, TrackSummary};
use crate::services::vector_index::VectorIndex;
use crate::services::StageError;

pub const POOL_MULTIPLIER: usize = 4;

const SIMILAR_TRACKS_CONSIDERED: usize = 100;
const SIMILAR_TRACKS_TAKEN: usize = 50;
const SIMILAR_ARTISTS_USED: usize = 10;
const TRACKS_PER_ARTIST: usize = 5;
const TAG_TRACKS: usize = 20;
const ENRICH_CONCURRENCY: usize = 8;

pub struct CandidateGenerator {
    similarity: Arc<dyn SimilaritySource>,
    catalog: Arc<dyn CatalogSource>,
    enricher: TrackEnricher,
    vectors: Option<Arc<dyn VectorIndex>>,
}

/// Pool under construction plus its dedup set
struct PoolBuilder {
    pool: Vec<EnrichedTrack>,
    seen: HashSet<String>,
    capacity: usize,
}

impl PoolBuilder {
    fn new(seed: EnrichedTrack, capacity: usize) -> Self {
        let mut seen = HashSet::new();
        seen.insert(seed.track.canonical_key());
        seen.insert(title_key(&seed.track.title));
        Self {
            pool: vec![seed],
            seen,
            capacity,
        }
    }

    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.pool.len())
    }

    fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Claim up to `want` unseen tracks from the front of `tracks`
    fn claim(
        &mut self,
        tracks: &mut std::vec::IntoIter<ResolvedTrack>,
        want: usize,
    ) -> Vec<ResolvedTrack> {
        let mut claimed = Vec::new();
        while claimed.len() < want {
            let Some(track) = tracks.next() else {
                break;
            };
            if self.seen.insert(track.canonical_key()) {
                claimed.push(track);
            }
        }
        claimed
    }
}

impl CandidateGenerator {
    pub fn new(
        similarity: Arc<dyn SimilaritySource>,
        catalog: Arc<dyn CatalogSource>,
        enricher: TrackEnricher,
        vectors: Option<Arc<dyn VectorIndex>>,
    ) -> Self {
        Self {
            similarity,
            catalog,
            enricher,
            vectors,
        }
    }

    /// Build the pool, stopping before any new source call once `token` fires
    pub async fn generate(
        &self,
        seed: EnrichedTrack,
        target_size: usize,
        token: &CancellationToken,
    ) -> Result<Vec<EnrichedTrack>, StageError> {
        let capacity = target_size.saturating_mul(POOL_MULTIPLIER).max(1);
        let seed_track = seed.track.clone();
        let seed_artists: Vec<String> = seed
            .similar_artists
            .iter()
            .take(SIMILAR_ARTISTS_USED)
            .cloned()
            .collect();
        let top_tag = seed.top_tag().map(|t| t.name.clone());

        let mut builder = PoolBuilder::new(seed, capacity);

        // 1. Similar tracks
        halt_if_cancelled(token)?;
        let similar = self
            .similarity
            .similar_tracks(&seed_track.artist, &seed_track.title, SIMILAR_TRACKS_CONSIDERED)
            .await?;
        self.admit(&mut builder, to_tracks(similar), SIMILAR_TRACKS_TAKEN, token)
            .await?;
        debug!(pool = builder.pool.len(), "After similar-track strategy");

        // 2. Similar artists' top tracks
        for artist in &seed_artists {
            if builder.is_full() {
                break;
            }
            halt_if_cancelled(token)?;
            let top = self
                .similarity
                .artist_top_tracks(artist, TRACKS_PER_ARTIST)
                .await?;
            self.admit(&mut builder, to_tracks(top), TRACKS_PER_ARTIST, token)
                .await?;
        }
        debug!(pool = builder.pool.len(), "After similar-artist strategy");

        // 3. Tag discovery
        if let Some(tag) = top_tag.filter(|_| !builder.is_full()) {
            halt_if_cancelled(token)?;
            let tagged = self.similarity.tag_top_tracks(&tag, TAG_TRACKS).await?;
            self.admit(&mut builder, to_tracks(tagged), TAG_TRACKS, token)
                .await?;
            debug!(tag = %tag, pool = builder.pool.len(), "After tag strategy");
        }

        // 4. Vector neighbours
        if !builder.is_full() {
            if let Some(vectors) = &self.vectors {
                let wanted = builder.remaining();
                let neighbours = self
                    .vector_neighbours(vectors.as_ref(), &seed_track, wanted, token)
                    .await?;
                self.admit(&mut builder, neighbours, wanted, token).await?;
                debug!(pool = builder.pool.len(), "After vector strategy");
            }
        }

        info!(
            seed = %seed_track.title,
            pool = builder.pool.len(),
            capacity = capacity,
            "Candidate pool generated"
        );
        Ok(builder.pool)
    }

    /// Enrich unseen tracks chunk by chunk until `quota` of them are admitted,
    /// the pool is full, or `tracks` runs out
    ///
    /// Tracks already in the pool and tracks that fail enrichment do not count
    /// against `quota`.
    async fn admit(
        &self,
        builder: &mut PoolBuilder,
        tracks: Vec<ResolvedTrack>,
        quota: usize,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        let mut tracks = tracks.into_iter();
        let mut admitted = 0usize;
        loop {
            let want = builder.remaining().min(quota - admitted);
            if want == 0 {
                return Ok(());
            }
            let chunk = builder.claim(&mut tracks, want);
            if chunk.is_empty() {
                return Ok(());
            }
            halt_if_cancelled(token)?;

            let results: Vec<Result<EnrichedTrack, StageError>> = stream::iter(chunk)
                .map(|track| {
                    let enricher = self.enricher.clone();
                    async move {
                        // Calls not yet issued are dropped once the run is cancelled
                        halt_if_cancelled(token)?;
                        enricher.enrich_light(track).await
                    }
                })
                .buffered(ENRICH_CONCURRENCY)
                .collect()
                .await;

            for result in results {
                match result {
                    Ok(enriched) => {
                        if !builder.is_full() {
                            builder.pool.push(enriched);
                            admitted += 1;
                        }
                    }
                    Err(e @ (StageError::RateLimited(_) | StageError::Cancelled)) => {
                        return Err(e);
                    }
                    Err(e) => debug!(error = %e, "Skipping candidate that failed enrichment"),
                }
            }
        }
    }

    async fn vector_neighbours(
        &self,
        vectors: &dyn VectorIndex,
        seed: &ResolvedTrack,
        wanted: usize,
        token: &CancellationToken,
    ) -> Result<Vec<ResolvedTrack>, StageError> {
        if seed.id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let Some(vector) = vectors.feature_vector(&seed.id).await? else {
            debug!(seed_id = %seed.id, "Seed has no feature vector");
            return Ok(Vec::new());
        };

        // One extra: the seed is usually its own nearest neighbour
        let matches = vectors.nearest(&vector, wanted + 1).await?;

        let mut tracks = Vec::new();
        for m in matches.into_iter().filter(|m| m.id != seed.id) {
            halt_if_cancelled(token)?;
            match self.catalog.lookup_recording(&m.id).await {
                Ok(Some(track)) => tracks.push(track),
                Ok(None) => debug!(id = %m.id, "Vector neighbour not in catalog"),
                Err(StageError::RateLimited(api)) => return Err(StageError::RateLimited(api)),
                Err(e) => warn!(id = %m.id, error = %e, "Vector neighbour lookup failed"),
            }
        }
        Ok(tracks)
    }
}

fn to_tracks(summaries: Vec<TrackSummary>) -> Vec<ResolvedTrack> {
    summaries.iter().map(TrackSummary::to_resolved).collect()
}

fn halt_if_cancelled(token: &CancellationToken) -> Result<(), StageError> {
    if token.is_cancelled() {
        Err(StageError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tag, TagSource};
    use crate::services::test_support::{summary, EmptyCatalog, ListSource};
    use std::collections::HashMap;

    fn enriched(title: &str, id: &str) -> EnrichedTrack {
        let mut track = ResolvedTrack::named(title, "Artist");
        track.id = id.to_string();
        EnrichedTrack::bare(track)
    }

    fn seed_with(artists: &[&str], tag: Option<&str>) -> EnrichedTrack {
        let mut seed = enriched("Teardrop", "seed");
        seed.similar_artists = artists.iter().map(|a| a.to_string()).collect();
        if let Some(tag) = tag {
            seed.tags = vec![
                Tag::new("electronic", 40, TagSource::Lastfm),
                Tag::new(tag, 100, TagSource::Lastfm),
            ];
        }
        seed
    }

    fn generator(source: Arc<ListSource>) -> CandidateGenerator {
        CandidateGenerator::new(
            source.clone(),
            Arc::new(EmptyCatalog),
            TrackEnricher::new(source),
            None,
        )
    }

    fn ids(pool: &[EnrichedTrack]) -> Vec<&str> {
        pool.iter().map(|t| t.track.id.as_str()).collect()
    }

    fn numbered(prefix: &str, n: usize) -> Vec<TrackSummary> {
        (0..n)
            .map(|i| summary(&format!("{} {}", prefix, i), &format!("{}-{}", prefix, i)))
            .collect()
    }

    #[test]
    fn test_pool_builder_rejects_seed_duplicates() {
        let mut builder = PoolBuilder::new(enriched("Teardrop", "seed-id"), 10);

        let mut same_id = ResolvedTrack::named("Teardrop (Remaster)", "Massive Attack");
        same_id.id = "seed-id".to_string();
        let same_title = ResolvedTrack::named("TEARDROP", "Massive Attack");
        let fresh = ResolvedTrack::named("Angel", "Massive Attack");

        let mut tracks = vec![same_id, same_title, fresh].into_iter();
        let claimed = builder.claim(&mut tracks, builder.remaining());
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].title, "Angel");
    }

    #[test]
    fn test_pool_builder_claims_up_to_want() {
        let mut builder = PoolBuilder::new(enriched("Seed", "s"), 10);

        let mut tracks = (0..5)
            .map(|i| {
                let mut t = ResolvedTrack::named(format!("Track {}", i), "A");
                t.id = format!("id-{}", i);
                t
            })
            .collect::<Vec<_>>()
            .into_iter();

        let claimed = builder.claim(&mut tracks, 2);
        assert_eq!(claimed.len(), 2);
        // Claimed-but-unenriched tracks are remembered
        assert!(builder.seen.contains("id:id-0"));
        assert_eq!(tracks.len(), 3);
    }

    #[tokio::test]
    async fn test_strategies_fill_pool_in_order_without_duplicates() {
        let mut similar = vec![summary("Teardrop", "seed")];
        similar.extend(numbered("sim", 10));
        similar.push(summary("Sim 3 (again)", "sim-3"));

        let mut a_top = vec![summary("Sim 1", "sim-1")];
        a_top.extend(numbered("a", 3));
        let mut tag_top = vec![summary("Sim 2", "sim-2"), summary("B 0", "b-0")];
        tag_top.extend(numbered("t", 5));

        let source = Arc::new(ListSource {
            similar,
            artist_top: HashMap::from([
                ("Artist A".to_string(), a_top),
                ("Artist B".to_string(), numbered("b", 5)),
            ]),
            tag_top,
            ..Default::default()
        });

        // target 5: capacity 20
        let pool = generator(source.clone())
            .generate(
                seed_with(&["Artist A", "Artist B"], Some("trip-hop")),
                5,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut expected = vec!["seed".to_string()];
        expected.extend((0..10).map(|i| format!("sim-{}", i)));
        expected.extend((0..3).map(|i| format!("a-{}", i)));
        expected.extend((0..5).map(|i| format!("b-{}", i)));
        expected.push("t-0".to_string());
        assert_eq!(ids(&pool), expected);

        assert_eq!(pool.len(), 5 * POOL_MULTIPLIER);
        let unique: HashSet<String> = pool.iter().map(|t| t.track.canonical_key()).collect();
        assert_eq!(unique.len(), pool.len());

        // Highest-count tag drives discovery; a full pool stops further calls
        assert_eq!(source.count("tag_top:trip-hop"), 1);
        assert_eq!(source.count("info:t 1"), 0);
        // Candidates are light-enriched with deduplicated tags
        assert_eq!(pool[1].tags.len(), 1);
        assert_eq!(pool[1].tags[0].count, 90);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_capacity() {
        let source = Arc::new(ListSource {
            similar: numbered("sim", 100),
            tag_top: numbered("t", 20),
            ..Default::default()
        });

        for target in [5usize, 15, 30] {
            let pool = generator(source.clone())
                .generate(seed_with(&[], Some("trip-hop")), target, &CancellationToken::new())
                .await
                .unwrap();

            let available = 1 + SIMILAR_TRACKS_TAKEN + TAG_TRACKS;
            assert_eq!(pool.len(), (target * POOL_MULTIPLIER).min(available));
            assert_eq!(pool[0].track.id, "seed");
            let unique: HashSet<String> = pool.iter().map(|t| t.track.canonical_key()).collect();
            assert_eq!(unique.len(), pool.len());
        }
    }

    #[tokio::test]
    async fn test_similar_quota_counts_only_new_tracks() {
        let mut similar = vec![summary("Teardrop", "seed"), summary("Sim 0", "sim-0")];
        similar.extend(numbered("sim", 70));

        let source = Arc::new(ListSource {
            similar,
            unknown: HashSet::from(["sim 5".to_string()]),
            ..Default::default()
        });

        let pool = generator(source)
            .generate(seed_with(&[], None), 50, &CancellationToken::new())
            .await
            .unwrap();

        // Seed, duplicate and unenrichable entries do not use up the 50 slots
        assert_eq!(pool.len(), 1 + SIMILAR_TRACKS_TAKEN);
        assert!(!ids(&pool).contains(&"sim-5"));
        assert_eq!(pool.last().unwrap().track.id, "sim-50");
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_new_source_calls() {
        let token = CancellationToken::new();
        let source = Arc::new(ListSource {
            similar: numbered("sim", 10),
            artist_top: HashMap::from([("Artist A".to_string(), numbered("a", 5))]),
            tag_top: numbered("t", 5),
            cancel_after_similar: Some(token.clone()),
            ..Default::default()
        });

        let result = generator(source.clone())
            .generate(seed_with(&["Artist A"], Some("trip-hop")), 15, &token)
            .await;

        assert_eq!(result.unwrap_err(), StageError::Cancelled);
        assert_eq!(source.calls(), vec!["similar".to_string()]);
    }

    #[tokio::test]
    async fn test_precancelled_generation_makes_no_calls() {
        let token = CancellationToken::new();
        token.cancel();
        let source = Arc::new(ListSource {
            similar: numbered("sim", 10),
            ..Default::default()
        });

        let result = generator(source.clone())
            .generate(seed_with(&[], None), 15, &token)
            .await;
        assert_eq!(result.unwrap_err(), StageError::Cancelled);
        assert!(source.calls().is_empty());
    }
}
