//! Similarity scoring
//!
//! Five dimensions in [0, 1] combined into an `overall` score in [0, 10]:
//!
//! | dimension          | weight |
//! |--------------------|--------|
//! | tag overlap        | 0.25   |
//! | artist similarity  | 0.20   |
//! | temporal proximity | 0.15   |
//! | vector similarity  | 0.25   |
//! | popularity fit     | 0.15   |

use std::collections::{HashMap, HashSet};

use crate::models::{Category, EnrichedTrack, PopularityBias, Preferences, ScoredTrack, Scores};

pub const TAG_WEIGHT: f64 = 0.25;
pub const ARTIST_WEIGHT: f64 = 0.20;
pub const TEMPORAL_WEIGHT: f64 = 0.15;
pub const VECTOR_WEIGHT: f64 = 0.25;
pub const POPULARITY_WEIGHT: f64 = 0.15;

/// Playcount above which a track is `popular`
pub const POPULAR_PLAYCOUNT: u64 = 1_000_000;
/// Playcount above which a track is a `deep-cut`
pub const DEEP_CUT_PLAYCOUNT: u64 = 100_000;

const NEUTRAL: f64 = 0.5;
const ERA_PENALTY: f64 = 0.2;
const TEMPORAL_SIGMA: f64 = 10.0;

/// Feature vectors by catalog id, used for the vector dimension
pub type FeatureVectors = HashMap<String, Vec<f32>>;

/// Score every candidate against the seed, best first
///
/// The sort is stable: equal scores keep discovery order.
pub fn score(
    seed: &EnrichedTrack,
    candidates: &[EnrichedTrack],
    preferences: Option<&Preferences>,
    vectors: &FeatureVectors,
) -> Vec<ScoredTrack> {
    let seed_tags = tag_set(seed);
    let seed_vector = vectors.get(seed.track.id.as_str());
    let era = preferences.and_then(|p| p.era_range);
    let bias = preferences.and_then(|p| p.popularity_bias);

    let mut scored: Vec<ScoredTrack> = candidates
        .iter()
        .map(|candidate| {
            let vector = match (seed_vector, vectors.get(candidate.track.id.as_str())) {
                (Some(a), Some(b)) => Some(crate::services::vector_index::cosine_similarity(a, b)),
                _ => None,
            };

            let scores = combine(
                tag_overlap(&seed_tags, &tag_set(candidate)),
                artist_similarity(seed, candidate),
                temporal_proximity(
                    seed.track.release_year,
                    candidate.track.release_year,
                    era,
                ),
                vector_similarity(vector),
                popularity_fit(candidate.playcount, bias),
            );

            ScoredTrack {
                track: candidate.clone(),
                scores,
                category: categorize(candidate.playcount),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.scores.overall.total_cmp(&a.scores.overall));
    scored
}

/// Clamp the dimensions and compute the weighted `overall`
pub fn combine(
    tag_overlap: f64,
    artist_similarity: f64,
    temporal_proximity: f64,
    vector_similarity: f64,
    popularity_fit: f64,
) -> Scores {
    let tag_overlap = unit(tag_overlap);
    let artist_similarity = unit(artist_similarity);
    let temporal_proximity = unit(temporal_proximity);
    let vector_similarity = unit(vector_similarity);
    let popularity_fit = unit(popularity_fit);

    let overall = 10.0
        * (TAG_WEIGHT * tag_overlap
            + ARTIST_WEIGHT * artist_similarity
            + TEMPORAL_WEIGHT * temporal_proximity
            + VECTOR_WEIGHT * vector_similarity
            + POPULARITY_WEIGHT * popularity_fit);

    Scores {
        tag_overlap,
        artist_similarity,
        temporal_proximity,
        vector_similarity,
        popularity_fit,
        overall: overall.clamp(0.0, 10.0),
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn tag_set(track: &EnrichedTrack) -> HashSet<String> {
    track
        .tags
        .iter()
        .map(|t| t.folded_name())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Jaccard index; 0 when either side has no tags
pub fn tag_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

pub fn artist_similarity(seed: &EnrichedTrack, candidate: &EnrichedTrack) -> f64 {
    let seed_artist = seed.track.artist.trim().to_lowercase();
    let candidate_artist = candidate.track.artist.trim().to_lowercase();

    if seed_artist == candidate_artist {
        1.0
    } else if contains_folded(&seed.similar_artists, &candidate_artist) {
        0.8
    } else if contains_folded(&candidate.similar_artists, &seed_artist) {
        0.6
    } else {
        0.0
    }
}

fn contains_folded(names: &[String], folded: &str) -> bool {
    names.iter().any(|n| n.trim().to_lowercase() == folded)
}

pub fn temporal_proximity(
    seed_year: Option<i32>,
    candidate_year: Option<i32>,
    era: Option<(i32, i32)>,
) -> f64 {
    if let (Some((start, end)), Some(year)) = (era, candidate_year) {
        if year < start || year > end {
            return ERA_PENALTY;
        }
    }

    match (seed_year, candidate_year) {
        (Some(a), Some(b)) => {
            let delta = (a - b) as f64;
            (-(delta * delta) / (2.0 * TEMPORAL_SIGMA * TEMPORAL_SIGMA)).exp()
        }
        _ => NEUTRAL,
    }
}

/// Cosine similarity clamped to [0, 1]; neutral without vectors
pub fn vector_similarity(cosine: Option<f64>) -> f64 {
    cosine.map(unit).unwrap_or(NEUTRAL)
}

/// `min(1, log10(playcount + 1) / 8)`; unknown playcount counts as 0
pub fn normalized_popularity(playcount: Option<u64>) -> f64 {
    let plays = playcount.unwrap_or(0) as f64;
    ((plays + 1.0).log10() / 8.0).min(1.0)
}

pub fn popularity_fit(playcount: Option<u64>, bias: Option<PopularityBias>) -> f64 {
    let normalized = normalized_popularity(playcount);
    match bias {
        Some(PopularityBias::Popular) => normalized,
        Some(PopularityBias::DeepCuts) => 0.3 + (1.0 - normalized) * 0.4,
        Some(PopularityBias::HiddenGems) => {
            if normalized < 0.3 {
                1.0 - normalized
            } else {
                0.2
            }
        }
        Some(PopularityBias::Balanced) | None => NEUTRAL,
    }
}

pub fn categorize(playcount: Option<u64>) -> Category {
    match playcount {
        Some(p) if p > POPULAR_PLAYCOUNT => Category::Popular,
        Some(p) if p > DEEP_CUT_PLAYCOUNT => Category::DeepCut,
        _ => Category::HiddenGem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResolvedTrack, Tag, TagSource};

    fn track(title: &str, artist: &str, tags: &[&str], playcount: Option<u64>) -> EnrichedTrack {
        let mut t = EnrichedTrack::bare(ResolvedTrack::named(title, artist));
        t.tags = tags
            .iter()
            .map(|n| Tag::new(*n, 10, TagSource::Lastfm))
            .collect();
        t.playcount = playcount;
        t
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_overlap_jaccard() {
        assert_eq!(tag_overlap(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(tag_overlap(&set(&[]), &set(&["a"])), 0.0);
        assert_eq!(tag_overlap(&set(&["a"]), &set(&["a"])), 1.0);
    }

    #[test]
    fn test_artist_similarity_levels() {
        let mut seed = track("Teardrop", "Massive Attack", &[], None);
        seed.similar_artists = vec!["Portishead".to_string()];

        assert_eq!(artist_similarity(&seed, &track("Angel", "massive attack", &[], None)), 1.0);
        assert_eq!(artist_similarity(&seed, &track("Roads", "PORTISHEAD", &[], None)), 0.8);

        let mut tricky = track("Hymn", "Tricky", &[], None);
        tricky.similar_artists = vec!["Massive Attack".to_string()];
        assert_eq!(artist_similarity(&seed, &tricky), 0.6);

        assert_eq!(artist_similarity(&seed, &track("x", "Metallica", &[], None)), 0.0);
    }

    #[test]
    fn test_temporal_proximity() {
        assert_eq!(temporal_proximity(Some(1997), Some(1997), None), 1.0);
        assert_eq!(temporal_proximity(None, Some(1997), None), 0.5);
        assert_eq!(temporal_proximity(Some(1997), Some(2010), Some((1990, 2000))), 0.2);
        // Inside the era, Gaussian decay applies
        let ten_years = temporal_proximity(Some(1990), Some(2000), Some((1980, 2005)));
        assert!((ten_years - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_popularity_fit_biases() {
        let n = normalized_popularity(Some(99_999_999));
        assert!((n - 1.0).abs() < 1e-9);
        assert_eq!(normalized_popularity(None), 0.0);

        assert_eq!(popularity_fit(Some(1_000), None), 0.5);
        assert_eq!(popularity_fit(Some(1_000), Some(PopularityBias::Balanced)), 0.5);

        let popular = popularity_fit(Some(9_999), Some(PopularityBias::Popular));
        assert!((popular - 0.5).abs() < 1e-3);

        let deep = popularity_fit(None, Some(PopularityBias::DeepCuts));
        assert!((deep - 0.7).abs() < 1e-12);

        assert_eq!(popularity_fit(None, Some(PopularityBias::HiddenGems)), 1.0);
        assert_eq!(
            popularity_fit(Some(10_000_000), Some(PopularityBias::HiddenGems)),
            0.2
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(categorize(Some(1_000_001)), Category::Popular);
        assert_eq!(categorize(Some(1_000_000)), Category::DeepCut);
        assert_eq!(categorize(Some(100_001)), Category::DeepCut);
        assert_eq!(categorize(Some(100_000)), Category::HiddenGem);
        assert_eq!(categorize(None), Category::HiddenGem);
    }

    #[test]
    fn test_overall_is_weighted_sum_within_bounds() {
        let scores = combine(1.5, -0.2, 0.5, f64::NAN, 1.0);
        assert_eq!(scores.tag_overlap, 1.0);
        assert_eq!(scores.artist_similarity, 0.0);
        assert_eq!(scores.vector_similarity, 0.0);

        let expected = 10.0 * (0.25 * 1.0 + 0.15 * 0.5 + 0.15 * 1.0);
        assert!((scores.overall - expected).abs() < 1e-9);
    }

    #[test]
    fn test_vector_similarity_uses_cosine_or_neutral() {
        assert_eq!(vector_similarity(None), 0.5);
        assert_eq!(vector_similarity(Some(-0.4)), 0.0);
        assert_eq!(vector_similarity(Some(0.9)), 0.9);
    }

    #[test]
    fn test_score_sorts_stably_descending() {
        let seed = track("Seed", "Seed Artist", &["trip-hop", "electronic"], None);
        let candidates = vec![
            track("First tie", "Other", &["rock"], Some(10)),
            track("Best", "Seed Artist", &["trip-hop", "electronic"], Some(10)),
            track("Second tie", "Other", &["metal"], Some(10)),
        ];

        let scored = score(&seed, &candidates, None, &FeatureVectors::new());
        let titles: Vec<&str> = scored.iter().map(|s| s.track.track.title.as_str()).collect();
        assert_eq!(titles, vec!["Best", "First tie", "Second tie"]);

        for pair in scored.windows(2) {
            assert!(pair[0].scores.overall >= pair[1].scores.overall);
        }
        for s in &scored {
            assert!((0.0..=10.0).contains(&s.scores.overall));
        }
    }

    #[test]
    fn test_score_uses_feature_vectors_by_id() {
        let mut seed = track("Seed", "A", &[], None);
        seed.track.id = "seed".to_string();
        let mut near = track("Near", "B", &[], None);
        near.track.id = "near".to_string();

        let mut vectors = FeatureVectors::new();
        vectors.insert("seed".to_string(), vec![1.0, 0.0]);
        vectors.insert("near".to_string(), vec![1.0, 0.0]);

        let scored = score(&seed, &[near], None, &vectors);
        assert!((scored[0].scores.vector_similarity - 1.0).abs() < 1e-9);
    }
}
