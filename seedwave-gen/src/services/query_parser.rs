//! Free-text seed query parsing
//!
//! Patterns are tried in order:
//! 1. "Track by Artist"
//! 2. "Artist - Track" (hyphen, en dash, or em dash, surrounded by whitespace)
//! 3. "Track, Artist"
//!
//! Anything else is a track-only search term.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub track: String,
    pub artist: Option<String>,
}

impl ParsedQuery {
    fn track_only(track: &str) -> Self {
        Self {
            track: track.to_string(),
            artist: None,
        }
    }

    fn pair(track: &str, artist: &str) -> Option<Self> {
        let track = track.trim();
        let artist = artist.trim();
        if track.is_empty() || artist.is_empty() {
            return None;
        }
        Some(Self {
            track: track.to_string(),
            artist: Some(artist.to_string()),
        })
    }
}

const DASHES: [char; 3] = ['-', '\u{2013}', '\u{2014}'];

pub fn parse_query(query: &str) -> ParsedQuery {
    let query = query.trim();

    parse_by(query)
        .or_else(|| parse_dash(query))
        .or_else(|| parse_comma(query))
        .unwrap_or_else(|| ParsedQuery::track_only(query))
}

/// "X by Y", split on the last " by " so titles like "Stand by Me by Ben E. King" work
fn parse_by(query: &str) -> Option<ParsedQuery> {
    let lower = query.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; only trust ASCII offsets
    if lower.len() != query.len() {
        return None;
    }
    let idx = lower.rfind(" by ")?;
    ParsedQuery::pair(&query[..idx], &query[idx + 4..])
}

/// "Y - X": artist first
fn parse_dash(query: &str) -> Option<ParsedQuery> {
    let mut chars = query.char_indices().peekable();
    let mut prev_ws = false;
    while let Some((idx, c)) = chars.next() {
        if DASHES.contains(&c) && prev_ws {
            let next_ws = chars.peek().map(|(_, n)| n.is_whitespace()).unwrap_or(false);
            if next_ws {
                let artist = &query[..idx];
                let track = &query[idx + c.len_utf8()..];
                return ParsedQuery::pair(track, artist);
            }
        }
        prev_ws = c.is_whitespace();
    }
    None
}

/// "X, Y": track first, split on the first comma
fn parse_comma(query: &str) -> Option<ParsedQuery> {
    let (track, artist) = query.split_once(',')?;
    ParsedQuery::pair(track, artist)
}
