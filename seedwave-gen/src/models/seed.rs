//! User-supplied run input

use serde::{Deserialize, Serialize};

/// Allowed playlist lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PlaylistSize {
    Fifteen,
    Thirty,
    Fifty,
    SeventyFive,
    Hundred,
}

impl PlaylistSize {
    pub const ALLOWED: [u32; 5] = [15, 30, 50, 75, 100];

    pub fn tracks(self) -> usize {
        u32::from(self) as usize
    }
}

impl TryFrom<u32> for PlaylistSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            15 => Ok(PlaylistSize::Fifteen),
            30 => Ok(PlaylistSize::Thirty),
            50 => Ok(PlaylistSize::Fifty),
            75 => Ok(PlaylistSize::SeventyFive),
            100 => Ok(PlaylistSize::Hundred),
            other => Err(format!(
                "playlist size {} is not one of {:?}",
                other,
                PlaylistSize::ALLOWED
            )),
        }
    }
}

impl From<PlaylistSize> for u32 {
    fn from(size: PlaylistSize) -> Self {
        match size {
            PlaylistSize::Fifteen => 15,
            PlaylistSize::Thirty => 30,
            PlaylistSize::Fifty => 50,
            PlaylistSize::SeventyFive => 75,
            PlaylistSize::Hundred => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodBias {
    Energetic,
    Chill,
    Melancholic,
    Upbeat,
    Dark,
}

impl MoodBias {
    pub fn as_str(self) -> &'static str {
        match self {
            MoodBias::Energetic => "energetic",
            MoodBias::Chill => "chill",
            MoodBias::Melancholic => "melancholic",
            MoodBias::Upbeat => "upbeat",
            MoodBias::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopularityBias {
    Popular,
    DeepCuts,
    HiddenGems,
    Balanced,
}

/// Optional listener preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Inclusive `[startYear, endYear]`
    #[serde(default)]
    pub era_range: Option<(i32, i32)>,
    #[serde(default)]
    pub mood_bias: Option<MoodBias>,
    #[serde(default)]
    pub popularity_bias: Option<PopularityBias>,
}

/// Seed input, immutable once a run starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedTrackInput {
    pub query: String,
    pub playlist_size: PlaylistSize,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

impl SeedTrackInput {
    /// Reject input no stage could work with
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if let Some((start, end)) = self.preferences.as_ref().and_then(|p| p.era_range) {
            if start > end {
                return Err(format!("era range start {} is after end {}", start, end));
            }
        }
        Ok(())
    }

    pub fn mood_bias(&self) -> Option<MoodBias> {
        self.preferences.as_ref().and_then(|p| p.mood_bias)
    }
}
