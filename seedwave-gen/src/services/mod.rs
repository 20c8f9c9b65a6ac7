//! Business logic services
//!
//! Source adapters, the six pipeline stages, and the orchestrator that
//! sequences them.

pub mod archive;
pub mod cache;
pub mod candidate_generator;
pub mod curator;
pub mod enricher;
pub mod explainer;
pub mod lastfm_client;
pub mod llm;
pub mod musicbrainz_client;
pub mod pipeline;
pub mod query_parser;
pub mod rate_limiter;
pub mod resolver;
pub mod scorer;
pub mod sources;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod test_support;

pub use archive::{archive_key, ArchiveStore, FileArchive};
pub use cache::{MemoryResponseCache, ResponseCache, SqliteResponseCache};
pub use candidate_generator::CandidateGenerator;
pub use enricher::TrackEnricher;
pub use explainer::Explainer;
pub use lastfm_client::LastFmClient;
pub use musicbrainz_client::MusicBrainzClient;
pub use pipeline::{PipelineOrchestrator, PipelineServices, PipelineSettings, RunError};
pub use rate_limiter::{Admission, RateLimiter};
pub use resolver::TrackResolver;
pub use sources::{CatalogSource, SimilaritySource};
pub use vector_index::{InMemoryVectorIndex, VectorIndex};

use crate::models::ErrorCode;
use thiserror::Error;

/// Failure taxonomy shared by source adapters and pipeline stages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Query or track cannot be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream throttling outlasted the adapter's retry
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// Network failure, 5xx, timeout, or storage failure
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Malformed input or illegal state transition
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl StageError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StageError::NotFound(_) => ErrorCode::NotFound,
            StageError::RateLimited(_) => ErrorCode::RateLimited,
            StageError::UpstreamUnavailable(_) => ErrorCode::UpstreamUnavailable,
            StageError::Validation(_) => ErrorCode::ValidationError,
            StageError::Cancelled => ErrorCode::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<seedwave_common::Error> for StageError {
    fn from(err: seedwave_common::Error) -> Self {
        StageError::UpstreamUnavailable(format!("storage: {}", err))
    }
}

impl From<crate::models::TransitionError> for StageError {
    fn from(err: crate::models::TransitionError) -> Self {
        StageError::Validation(err.to_string())
    }
}
