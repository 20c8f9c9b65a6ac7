//! Pipeline state machine
//!
//! A run progresses through a fixed sequence of states:
//! PENDING → RESOLVING → ENRICHING → GENERATING → SCORING → CURATING → EXPLAINING → COMPLETE
//!
//! FAILED is terminal and reachable from any non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::seed::SeedTrackInput;
use super::track::{EnrichedTrack, PlaylistTrack, ResolvedTrack, ScoredTrack};

/// Pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Created, background execution not yet started
    Pending,
    /// Free-text query → canonical track
    Resolving,
    /// Tags, similar tracks, similar artists for the seed
    Enriching,
    /// Candidate pool discovery
    Generating,
    /// Multi-dimensional scoring
    Scoring,
    /// Quota-based selection and ordering
    Curating,
    /// Reasons and flow roles
    Explaining,
    Complete,
    Failed,
}

impl PipelineStatus {
    /// Progress reported on entering this state
    ///
    /// `Failed` has no progress of its own; a failed run keeps the progress of
    /// the last state it entered.
    pub fn progress(self) -> Option<u8> {
        match self {
            PipelineStatus::Pending => Some(0),
            PipelineStatus::Resolving => Some(10),
            PipelineStatus::Enriching => Some(25),
            PipelineStatus::Generating => Some(40),
            PipelineStatus::Scoring => Some(60),
            PipelineStatus::Curating => Some(75),
            PipelineStatus::Explaining => Some(90),
            PipelineStatus::Complete => Some(100),
            PipelineStatus::Failed => None,
        }
    }

    /// Immediate successor on the success path
    pub fn next(self) -> Option<PipelineStatus> {
        match self {
            PipelineStatus::Pending => Some(PipelineStatus::Resolving),
            PipelineStatus::Resolving => Some(PipelineStatus::Enriching),
            PipelineStatus::Enriching => Some(PipelineStatus::Generating),
            PipelineStatus::Generating => Some(PipelineStatus::Scoring),
            PipelineStatus::Scoring => Some(PipelineStatus::Curating),
            PipelineStatus::Curating => Some(PipelineStatus::Explaining),
            PipelineStatus::Explaining => Some(PipelineStatus::Complete),
            PipelineStatus::Complete | PipelineStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStatus::Complete | PipelineStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Resolving => "resolving",
            PipelineStatus::Enriching => "enriching",
            PipelineStatus::Generating => "generating",
            PipelineStatus::Scoring => "scoring",
            PipelineStatus::Curating => "curating",
            PipelineStatus::Explaining => "explaining",
            PipelineStatus::Complete => "complete",
            PipelineStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure codes surfaced to status readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    RateLimited,
    UpstreamUnavailable,
    ValidationError,
    Cancelled,
}

impl ErrorCode {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::RateLimited | ErrorCode::UpstreamUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

/// Error recorded on a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineError {
    pub code: ErrorCode,
    pub message: String,
    /// State the run was in when it failed
    pub stage: PipelineStatus,
    pub retryable: bool,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_status: PipelineStatus,
    pub new_status: PipelineStatus,
    pub transitioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to}")]
    Illegal {
        from: PipelineStatus,
        to: PipelineStatus,
    },

    #[error("run already in terminal state {0}")]
    Terminal(PipelineStatus),
}

/// Full durable record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub run_id: Uuid,
    pub user_id: String,
    pub status: PipelineStatus,
    pub input: SeedTrackInput,
    #[serde(default)]
    pub resolved_track: Option<ResolvedTrack>,
    /// Enriched seed at index 0, candidates after it
    #[serde(default)]
    pub candidate_pool: Vec<EnrichedTrack>,
    #[serde(default)]
    pub scored_candidates: Vec<ScoredTrack>,
    #[serde(default)]
    pub playlist: Vec<PlaylistTrack>,
    pub progress: u8,
    #[serde(default)]
    pub error: Option<PipelineError>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// New run in `pending`
    pub fn new(user_id: impl Into<String>, input: SeedTrackInput) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user_id: user_id.into(),
            status: PipelineStatus::Pending,
            input,
            resolved_track: None,
            candidate_pool: Vec::new(),
            scored_candidates: Vec::new(),
            playlist: Vec::new(),
            progress: 0,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Advance along the success path
    ///
    /// Only the immediate successor of the current status is accepted.
    pub fn transition_to(
        &mut self,
        new_status: PipelineStatus,
    ) -> Result<StateTransition, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if self.status.next() != Some(new_status) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: new_status,
            });
        }

        let transition = self.record_transition(new_status);
        if let Some(progress) = new_status.progress() {
            self.progress = self.progress.max(progress);
        }
        Ok(transition)
    }

    /// Enter `failed` with a typed error attributed to the current stage
    pub fn fail(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<StateTransition, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }

        self.error = Some(PipelineError {
            code,
            message: message.into(),
            stage: self.status,
            retryable: code.is_retryable(),
        });
        Ok(self.record_transition(PipelineStatus::Failed))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Read-side view shared by polling and streaming
    pub fn snapshot(&self) -> RunStatus {
        RunStatus {
            run_id: self.run_id,
            status: self.status,
            progress: self.progress,
            playlist: (self.status == PipelineStatus::Complete).then(|| self.playlist.clone()),
            error: self.error.clone(),
        }
    }

    fn record_transition(&mut self, new_status: PipelineStatus) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(transition.transitioned_at);
        }
        transition
    }
}

/// Status snapshot returned to pollers and streamed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub run_id: Uuid,
    pub status: PipelineStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist: Option<Vec<PlaylistTrack>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
}
