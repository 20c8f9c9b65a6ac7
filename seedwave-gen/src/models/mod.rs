//! Data models for seedwave-gen

pub mod pipeline_state;
pub mod seed;
pub mod track;

pub use pipeline_state::{
    ErrorCode, PipelineError, PipelineState, PipelineStatus, RunStatus, StateTransition,
    TransitionError,
};
pub use seed::{MoodBias, PlaylistSize, PopularityBias, Preferences, SeedTrackInput};
pub use track::{
    dedup_tags, title_key, Category, EnrichedTrack, FlowRole, PlaylistTrack, ResolvedTrack,
    ScoredTrack, Scores, Tag, TagSource,
};
