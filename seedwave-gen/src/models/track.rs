//! Track records flowing through the pipeline
//!
//! Each stage wraps the previous stage's record: ResolvedTrack → EnrichedTrack
//! → ScoredTrack → PlaylistTrack.

use serde::{Deserialize, Serialize};

/// Canonical track identity produced by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTrack {
    /// Opaque catalog id; empty when the source had none
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub artist_id: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_id: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ResolvedTrack {
    /// Minimal track with only title and artist known
    pub fn named(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            artist: artist.into(),
            artist_id: String::new(),
            album: None,
            album_id: None,
            release_year: None,
            duration_ms: None,
            url: None,
        }
    }

    /// Deduplication key: the id when present, else the case-folded title
    pub fn canonical_key(&self) -> String {
        let id = self.id.trim();
        if id.is_empty() {
            title_key(&self.title)
        } else {
            format!("id:{}", id)
        }
    }
}

/// Key used when a track has no id
pub fn title_key(title: &str) -> String {
    format!("title:{}", title.trim().to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Lastfm,
    Musicbrainz,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    /// Frequency weight reported by the source
    pub count: u32,
    pub source: TagSource,
}

impl Tag {
    pub fn new(name: impl Into<String>, count: u32, source: TagSource) -> Self {
        Self {
            name: name.into(),
            count,
            source,
        }
    }

    pub fn folded_name(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// Collapse tags with the same case-folded name, keeping the highest count
///
/// First-seen order is kept.
pub fn dedup_tags(tags: Vec<Tag>) -> Vec<Tag> {
    let mut out: Vec<Tag> = Vec::with_capacity(tags.len());
    for tag in tags {
        let folded = tag.folded_name();
        if folded.is_empty() {
            continue;
        }
        match out.iter_mut().find(|t| t.folded_name() == folded) {
            Some(existing) => {
                if tag.count > existing.count {
                    existing.count = tag.count;
                }
            }
            None => out.push(tag),
        }
    }
    out
}

/// Resolved track plus tags, similarity lists, and listening stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTrack {
    pub track: ResolvedTrack,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub similar_track_ids: Vec<String>,
    #[serde(default)]
    pub similar_artists: Vec<String>,
    #[serde(default)]
    pub listeners: Option<u64>,
    #[serde(default)]
    pub playcount: Option<u64>,
    /// Duration reported by the similarity source; `track.duration_ms` is left as resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_album: Option<String>,
}

impl EnrichedTrack {
    /// Enriched record with every enrichment field empty
    pub fn bare(track: ResolvedTrack) -> Self {
        Self {
            track,
            tags: Vec::new(),
            similar_track_ids: Vec::new(),
            similar_artists: Vec::new(),
            listeners: None,
            playcount: None,
            reported_duration_ms: None,
            reported_album: None,
        }
    }

    /// Resolved album, else the one reported during enrichment
    pub fn album(&self) -> Option<&str> {
        self.track.album.as_deref().or(self.reported_album.as_deref())
    }

    /// Tag with the highest count; the first one wins ties
    pub fn top_tag(&self) -> Option<&Tag> {
        let mut best: Option<&Tag> = None;
        for tag in &self.tags {
            match best {
                Some(current) if tag.count <= current.count => {}
                _ => best = Some(tag),
            }
        }
        best
    }
}

/// Per-dimension similarity scores
///
/// Dimensions are in [0, 1]; `overall` is in [0, 10].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub tag_overlap: f64,
    pub artist_similarity: f64,
    pub temporal_proximity: f64,
    pub vector_similarity: f64,
    pub popularity_fit: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Popular,
    DeepCut,
    HiddenGem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTrack {
    pub track: EnrichedTrack,
    pub scores: Scores,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowRole {
    Opener,
    Builder,
    Peak,
    Valley,
    Closer,
    Transition,
}

impl FlowRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowRole::Opener => "opener",
            FlowRole::Builder => "builder",
            FlowRole::Peak => "peak",
            FlowRole::Valley => "valley",
            FlowRole::Closer => "closer",
            FlowRole::Transition => "transition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistTrack {
    pub track: ScoredTrack,
    /// 1-based
    pub position: usize,
    /// Filled by the explainer; empty until then
    #[serde(default)]
    pub reason: String,
    pub flow_role: FlowRole,
    /// `overall` rounded into 1..=10
    pub similarity_score: u8,
}

impl PlaylistTrack {
    pub fn resolved(&self) -> &ResolvedTrack {
        &self.track.track.track
    }
}
