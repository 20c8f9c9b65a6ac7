//! Event types for the Seedwave event system
//!
//! Provides run lifecycle event definitions and the EventBus shared by the
//! pipeline and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Seedwave event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Stage and status names are carried as their wire strings so that this
/// crate stays independent of the pipeline's model types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SeedwaveEvent {
    /// A run left `pending` and its background task began executing
    RunStarted {
        run_id: Uuid,
        user_id: String,
        query: String,
        timestamp: DateTime<Utc>,
    },

    /// A run entered a new pipeline state
    ///
    /// Emitted after the state has been persisted, so subscribers never see
    /// progress that a status poll could not also observe.
    RunProgress {
        run_id: Uuid,
        /// Pipeline status entered (e.g. "enriching")
        status: String,
        /// Progress associated with the status (0-100)
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// A run reached `complete`
    RunCompleted {
        run_id: Uuid,
        track_count: usize,
        processing_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run reached `failed` (including cancellation)
    RunFailed {
        run_id: Uuid,
        /// Error code (e.g. "NOT_FOUND", "CANCELLED")
        code: String,
        /// Stage the run was in when it failed
        stage: String,
        retryable: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SeedwaveEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            SeedwaveEvent::RunStarted { .. } => "RunStarted",
            SeedwaveEvent::RunProgress { .. } => "RunProgress",
            SeedwaveEvent::RunCompleted { .. } => "RunCompleted",
            SeedwaveEvent::RunFailed { .. } => "RunFailed",
        }
    }

    /// Run the event refers to
    pub fn run_id(&self) -> Uuid {
        match self {
            SeedwaveEvent::RunStarted { run_id, .. }
            | SeedwaveEvent::RunProgress { run_id, .. }
            | SeedwaveEvent::RunCompleted { run_id, .. }
            | SeedwaveEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for run lifecycle events
///
/// Cloning the bus is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SeedwaveEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SeedwaveEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; with no subscribers it is dropped
    pub fn emit_lossy(&self, event: SeedwaveEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
