//! Playlist explanations
//!
//! One batched LLM call covers the whole playlist. The reply is expected to
//! contain a JSON array of `{reason, flowRole}` aligned with the playlist;
//! the first parseable array anywhere in the text is used. Entries that are
//! missing or unusable fall back to a template for that track only. If the
//! call fails or no array can be found, every track gets a template.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{EnrichedTrack, FlowRole, MoodBias, PlaylistTrack};
use crate::services::llm::{CompletionOptions, LlmProvider, Message};

const SYSTEM_PROMPT: &str = "You are a music curator writing short liner notes for a playlist. \
Reply with a JSON array only.";

/// Artist similarity above which the adjacency template applies
const ADJACENCY_THRESHOLD: f64 = 0.5;
const MAX_SHARED_TAGS: usize = 2;

pub struct Explainer {
    llm: Option<Arc<dyn LlmProvider>>,
    options: CompletionOptions,
}

impl Explainer {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, options: CompletionOptions) -> Self {
        Self { llm, options }
    }

    /// Template-only explainer
    pub fn templates_only() -> Self {
        Self::new(None, CompletionOptions::default())
    }

    /// Fill `reason` for every track; never fails
    pub async fn explain(
        &self,
        seed: &EnrichedTrack,
        mut playlist: Vec<PlaylistTrack>,
        mood: Option<MoodBias>,
    ) -> Vec<PlaylistTrack> {
        if playlist.is_empty() {
            return playlist;
        }

        let entries = match &self.llm {
            Some(llm) => self.ask(llm.as_ref(), seed, &playlist, mood).await,
            None => None,
        };

        let mut from_llm = 0usize;
        for (i, track) in playlist.iter_mut().enumerate() {
            let entry = entries.as_ref().and_then(|e| e.get(i));

            match entry.and_then(entry_reason) {
                Some(reason) => {
                    track.reason = reason;
                    from_llm += 1;
                }
                None => track.reason = template_reason(seed, track, mood),
            }

            if let Some(role) = entry.and_then(entry_flow_role) {
                track.flow_role = role;
            }
        }

        info!(
            tracks = playlist.len(),
            llm_reasons = from_llm,
            "Playlist explained"
        );
        playlist
    }

    async fn ask(
        &self,
        llm: &dyn LlmProvider,
        seed: &EnrichedTrack,
        playlist: &[PlaylistTrack],
        mood: Option<MoodBias>,
    ) -> Option<Vec<Value>> {
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(build_prompt(seed, playlist, mood)),
        ];

        debug!(provider = llm.name(), model = llm.model(), tracks = playlist.len(), "Requesting explanations");
        match llm.complete(&messages, &self.options).await {
            Ok(text) => {
                let parsed = first_json_array(&text);
                if parsed.is_none() {
                    warn!(
                        provider = llm.name(),
                        model = llm.model(),
                        "LLM reply contained no JSON array, using templates"
                    );
                }
                parsed
            }
            Err(e) => {
                warn!(
                    provider = llm.name(),
                    model = llm.model(),
                    error = %e,
                    "LLM call failed, using templates"
                );
                None
            }
        }
    }
}

fn build_prompt(seed: &EnrichedTrack, playlist: &[PlaylistTrack], mood: Option<MoodBias>) -> String {
    let mut prompt = format!(
        "Seed track: \"{}\" by {}\n",
        seed.track.title, seed.track.artist
    );
    if let Some(mood) = mood {
        prompt.push_str(&format!("Requested mood: {}\n", mood.as_str()));
    }
    prompt.push_str("\nPlaylist:\n");

    for track in playlist {
        let resolved = track.resolved();
        let tags: Vec<&str> = track
            .track
            .track
            .tags
            .iter()
            .take(5)
            .map(|t| t.name.as_str())
            .collect();
        let album = track
            .track
            .track
            .album()
            .map(|a| format!(" (from {})", a))
            .unwrap_or_default();
        prompt.push_str(&format!(
            "{}. \"{}\" by {}{} | tags: {} | suggested role: {}\n",
            track.position,
            resolved.title,
            resolved.artist,
            album,
            if tags.is_empty() { "none".to_string() } else { tags.join(", ") },
            track.flow_role.as_str()
        ));
    }

    prompt.push_str(&format!(
        "\nFor each of the {} tracks, in order, write one sentence on why it fits after the seed. \
Reply with a JSON array of exactly {} objects: \
[{{\"reason\": \"...\", \"flowRole\": \"opener|builder|peak|valley|closer|transition\"}}]",
        playlist.len(),
        playlist.len()
    ));
    prompt
}

/// First substring of `text` that parses as a JSON array
pub fn first_json_array(text: &str) -> Option<Vec<Value>> {
    for (idx, _) in text.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Vec<Value>>();
        if let Some(Ok(array)) = stream.next() {
            return Some(array);
        }
    }
    None
}

fn entry_reason(entry: &Value) -> Option<String> {
    entry
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

fn entry_flow_role(entry: &Value) -> Option<FlowRole> {
    let raw = entry.get("flowRole").and_then(Value::as_str)?;
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).ok()
}

/// Deterministic explanation for one track
pub fn template_reason(seed: &EnrichedTrack, track: &PlaylistTrack, mood: Option<MoodBias>) -> String {
    let seed_title = &seed.track.title;
    let candidate = &track.track.track;

    let seed_tags: HashSet<String> = seed.tags.iter().map(|t| t.folded_name()).collect();
    let mut shared: Vec<_> = candidate
        .tags
        .iter()
        .filter(|t| seed_tags.contains(&t.folded_name()))
        .collect();
    shared.sort_by(|a, b| b.count.cmp(&a.count));

    if !shared.is_empty() {
        let names: Vec<String> = shared
            .iter()
            .take(MAX_SHARED_TAGS)
            .map(|t| t.folded_name())
            .collect();
        debug!(title = %candidate.track.title, "Shared-tag template");
        return if names.len() >= 2 {
            format!("Shares the {} and {} feel of \"{}\".", names[0], names[1], seed_title)
        } else {
            format!("Shares the {} sound of \"{}\".", names[0], seed_title)
        };
    }

    if track.track.scores.artist_similarity > ADJACENCY_THRESHOLD {
        let artist = &candidate.track.artist;
        if artist.trim().eq_ignore_ascii_case(seed.track.artist.trim()) {
            return format!("Another cut from {}, staying close to \"{}\".", artist, seed_title);
        }
        return format!(
            "{} sits right next to {} in sound and audience.",
            artist, seed.track.artist
        );
    }

    generic_reason(seed_title, mood)
}

fn generic_reason(seed_title: &str, mood: Option<MoodBias>) -> String {
    match mood {
        Some(mood) => format!("Keeps the {} mood of \"{}\" going.", mood.as_str(), seed_title),
        None => format!("Carries the mood of \"{}\" forward.", seed_title),
    }
}
