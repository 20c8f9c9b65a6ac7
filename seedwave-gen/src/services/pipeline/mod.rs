//! Playlist pipeline orchestrator
//!
//! # State Progression
//! PENDING → RESOLVING → ENRICHING → GENERATING → SCORING → CURATING → EXPLAINING → COMPLETE
//!
//! Each state is handled by a dedicated `phase_*` method. Entering a state
//! persists the full run state before that stage's work begins; the write is
//! conditional, so a cancellation stored in the meantime stops the run at
//! the next boundary and the in-flight stage's result is discarded.
//!
//! Each run executes as one background task. Stages within a run are
//! strictly sequential; runs are independent of each other.

use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use seedwave_common::events::{EventBus, SeedwaveEvent};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{access_log, pipeline_states, runs};
use crate::models::{
    ErrorCode, PipelineState, PipelineStatus, RunStatus, SeedTrackInput, TransitionError,
};
use crate::services::archive::{archive_key, ArchiveStore};
use crate::services::candidate_generator::CandidateGenerator;
use crate::services::enricher::TrackEnricher;
use crate::services::explainer::Explainer;
use crate::services::llm::{CompletionOptions, LlmProvider};
use crate::services::resolver::TrackResolver;
use crate::services::sources::{CatalogSource, SimilaritySource};
use crate::services::vector_index::VectorIndex;
use crate::services::StageError;

mod phase_curating;
mod phase_enriching;
mod phase_explaining;
mod phase_generating;
mod phase_resolving;
mod phase_scoring;

/// Collaborators the pipeline is built from
pub struct PipelineServices {
    pub catalog: Arc<dyn CatalogSource>,
    pub similarity: Arc<dyn SimilaritySource>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub llm_options: CompletionOptions,
    pub vectors: Option<Arc<dyn VectorIndex>>,
    pub archive: Option<Arc<dyn ArchiveStore>>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound for one stage's work
    pub stage_timeout: Duration,
    /// Re-read interval of status streams
    pub status_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(120),
            status_interval: Duration::from_millis(1000),
        }
    }
}

/// Errors of run management calls (create, start, cancel, status)
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run not found: {0}")]
    NotFound(Uuid),

    #[error("Run {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("Run {0} is not pending (status: {1})")]
    NotPending(Uuid, PipelineStatus),

    #[error("Run {0} already finished (status: {1})")]
    AlreadyTerminal(Uuid, PipelineStatus),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] seedwave_common::Error),
}

/// Pipeline orchestrator service
pub struct PipelineOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    resolver: TrackResolver,
    enricher: TrackEnricher,
    generator: CandidateGenerator,
    explainer: Explainer,
    vectors: Option<Arc<dyn VectorIndex>>,
    archive: Option<Arc<dyn ArchiveStore>>,
    settings: PipelineSettings,
    /// Cancellation tokens of runs with a live background task
    active_runs: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        services: PipelineServices,
        settings: PipelineSettings,
    ) -> Self {
        let enricher = TrackEnricher::new(Arc::clone(&services.similarity));
        let generator = CandidateGenerator::new(
            Arc::clone(&services.similarity),
            Arc::clone(&services.catalog),
            enricher.clone(),
            services.vectors.clone(),
        );

        if services.llm.is_none() {
            info!("No LLM configured, playlist reasons will use templates");
        }

        Self {
            db,
            event_bus,
            resolver: TrackResolver::new(services.catalog, services.similarity),
            enricher,
            generator,
            explainer: Explainer::new(services.llm, services.llm_options),
            vectors: services.vectors,
            archive: services.archive,
            settings,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Persist a new run in `pending`
    pub async fn create_run(
        &self,
        user_id: &str,
        input: SeedTrackInput,
    ) -> Result<PipelineState, RunError> {
        input.validate().map_err(RunError::InvalidInput)?;
        if user_id.trim().is_empty() {
            return Err(RunError::InvalidInput("userId must not be empty".to_string()));
        }

        let state = PipelineState::new(user_id, input);
        pipeline_states::save_state(&self.db, &state).await?;
        runs::create_run(&self.db, &state).await?;

        info!(run_id = %state.run_id, user_id = user_id, query = %state.input.query, "Run created");
        Ok(state)
    }

    /// Spawn the background task of a `pending` run
    pub async fn start_run(self: &Arc<Self>, run_id: Uuid) -> Result<(), RunError> {
        // Held across the checks so two starts cannot both pass them
        let mut active = self.active_runs.write().await;
        if active.contains_key(&run_id) {
            return Err(RunError::AlreadyRunning(run_id));
        }

        let state = pipeline_states::load_state(&self.db, run_id)
            .await?
            .ok_or(RunError::NotFound(run_id))?;
        if state.is_terminal() {
            return Err(RunError::AlreadyTerminal(run_id, state.status));
        }
        if state.status != PipelineStatus::Pending {
            return Err(RunError::NotPending(run_id, state.status));
        }

        let token = CancellationToken::new();
        active.insert(run_id, token.clone());
        drop(active);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute_run(state, token).await;
            this.active_runs.write().await.remove(&run_id);
        });

        Ok(())
    }

    /// Create and start a run
    pub async fn submit(
        self: &Arc<Self>,
        user_id: &str,
        input: SeedTrackInput,
    ) -> Result<RunStatus, RunError> {
        let state = self.create_run(user_id, input).await?;
        self.start_run(state.run_id).await?;
        Ok(state.snapshot())
    }

    pub async fn is_running(&self, run_id: Uuid) -> bool {
        self.active_runs.read().await.contains_key(&run_id)
    }

    pub async fn active_run_count(&self) -> usize {
        self.active_runs.read().await.len()
    }

    /// Execute all stages of a run; every outcome is persisted
    pub async fn execute_run(&self, mut state: PipelineState, token: CancellationToken) {
        let start_time = Instant::now();
        let run_id = state.run_id;

        info!(run_id = %run_id, query = %state.input.query, "Starting playlist pipeline");
        self.event_bus.emit_lossy(SeedwaveEvent::RunStarted {
            run_id,
            user_id: state.user_id.clone(),
            query: state.input.query.clone(),
            timestamp: Utc::now(),
        });

        match self.run_stages(&mut state, &token).await {
            Ok(()) => self.finish_complete(state, start_time).await,
            Err(StageError::Cancelled) => {
                info!(
                    run_id = %run_id,
                    stage = %state.status,
                    "Run cancelled, discarding in-flight stage result"
                );
            }
            Err(e) => self.finish_failed(state, e, start_time).await,
        }
    }

    async fn run_stages(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.phase_resolving(state, token).await?;
        self.phase_enriching(state, token).await?;
        self.phase_generating(state, token).await?;
        self.phase_scoring(state, token).await?;
        self.phase_curating(state, token).await?;
        self.phase_explaining(state, token).await?;

        self.enter(state, PipelineStatus::Complete, token).await
    }

    /// Transition, persist, and announce a new state
    ///
    /// `Err(Cancelled)` when the run was cancelled: either the token fired or
    /// a terminal state is already stored.
    async fn enter(
        &self,
        state: &mut PipelineState,
        status: PipelineStatus,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        checkpoint(token)?;

        let transition = state.transition_to(status)?;
        if !pipeline_states::save_state(&self.db, state).await? {
            return Err(StageError::Cancelled);
        }

        info!(
            run_id = %state.run_id,
            from = %transition.old_status,
            stage = %status,
            progress = state.progress,
            "Entered stage"
        );
        self.event_bus.emit_lossy(SeedwaveEvent::RunProgress {
            run_id: state.run_id,
            status: status.as_str().to_string(),
            progress: state.progress,
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    /// Run one stage's work under the stage timeout
    async fn run_stage<T, F>(&self, stage: PipelineStatus, work: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        match tokio::time::timeout(self.settings.stage_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(StageError::UpstreamUnavailable(format!(
                "{} stage timed out after {}s",
                stage,
                self.settings.stage_timeout.as_secs()
            ))),
        }
    }

    async fn finish_complete(&self, state: PipelineState, start_time: Instant) {
        let processing_ms = start_time.elapsed().as_millis() as u64;
        let run_id = state.run_id;

        if let Err(e) = runs::finalize_run(&self.db, &state, processing_ms).await {
            error!(run_id = %run_id, error = %e, "Failed to write run record");
        }

        info!(
            run_id = %run_id,
            tracks = state.playlist.len(),
            processing_ms = processing_ms,
            "Playlist pipeline completed"
        );
        self.event_bus.emit_lossy(SeedwaveEvent::RunCompleted {
            run_id,
            track_count: state.playlist.len(),
            processing_ms,
            timestamp: Utc::now(),
        });

        if let Some(archive) = self.archive.clone() {
            let key = archive_key(run_id, state.completed_at.unwrap_or_else(Utc::now));
            tokio::spawn(async move {
                if let Err(e) = archive.put(&key, &state).await {
                    warn!(run_id = %run_id, key = %key, error = %e, "Failed to archive run");
                }
            });
        }
    }

    async fn finish_failed(&self, mut state: PipelineState, err: StageError, start_time: Instant) {
        let run_id = state.run_id;
        let stage = state.status;

        if state.fail(err.code(), err.to_string()).is_err() {
            return;
        }
        error!(
            run_id = %run_id,
            stage = %stage,
            code = err.code().as_str(),
            retryable = err.is_retryable(),
            error = %err,
            "Playlist pipeline failed"
        );

        match pipeline_states::save_state(&self.db, &state).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(run_id = %run_id, "Run already terminal, failure not recorded");
                return;
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failed to persist run failure");
                return;
            }
        }

        let processing_ms = start_time.elapsed().as_millis() as u64;
        if let Err(e) = runs::finalize_run(&self.db, &state, processing_ms).await {
            error!(run_id = %run_id, error = %e, "Failed to write run record");
        }
        self.emit_failed(&state);
    }

    fn emit_failed(&self, state: &PipelineState) {
        if let Some(error) = &state.error {
            self.event_bus.emit_lossy(SeedwaveEvent::RunFailed {
                run_id: state.run_id,
                code: error.code.as_str().to_string(),
                stage: error.stage.as_str().to_string(),
                retryable: error.retryable,
                message: error.message.clone(),
                timestamp: state.completed_at.unwrap_or_else(Utc::now),
            });
        }
    }

    /// Mark a run `failed` with `CANCELLED`
    ///
    /// Best effort: an external call already in flight is not interrupted;
    /// the run stops at its next stage boundary.
    pub async fn cancel(&self, run_id: Uuid) -> Result<RunStatus, RunError> {
        let mut state = pipeline_states::load_state(&self.db, run_id)
            .await?
            .ok_or(RunError::NotFound(run_id))?;

        match state.fail(ErrorCode::Cancelled, "run cancelled by request") {
            Ok(_) => {}
            Err(TransitionError::Terminal(status)) | Err(TransitionError::Illegal { from: status, .. }) => {
                return Err(RunError::AlreadyTerminal(run_id, status));
            }
        }

        if !pipeline_states::save_state(&self.db, &state).await? {
            // Finished between the read and the write
            let stored = pipeline_states::load_state(&self.db, run_id)
                .await?
                .ok_or(RunError::NotFound(run_id))?;
            return Err(RunError::AlreadyTerminal(run_id, stored.status));
        }

        if let Some(token) = self.active_runs.read().await.get(&run_id) {
            token.cancel();
        }

        let processing_ms = (Utc::now() - state.started_at).num_milliseconds().max(0) as u64;
        runs::finalize_run(&self.db, &state, processing_ms).await?;

        info!(
            run_id = %run_id,
            stage = %state.error.as_ref().map(|e| e.stage).unwrap_or(state.status),
            "Run cancelled"
        );
        self.emit_failed(&state);
        Ok(state.snapshot())
    }

    /// Poll-once status read
    pub async fn status(&self, run_id: Uuid) -> Result<RunStatus, RunError> {
        let snapshot = self.snapshot(run_id).await?;
        access_log::record_access_detached(self.db.clone(), run_id, "poll");
        Ok(snapshot)
    }

    /// Status snapshots every `interval` until the run is terminal
    ///
    /// Uses the same read path as [`Self::status`]. The last item is the
    /// terminal snapshot (or the read error), after which the stream ends.
    pub fn status_stream(
        self: Arc<Self>,
        run_id: Uuid,
        interval: Duration,
    ) -> impl Stream<Item = Result<RunStatus, RunError>> + Send + 'static {
        access_log::record_access_detached(self.db.clone(), run_id, "stream");

        stream! {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.snapshot(run_id).await {
                    Ok(snapshot) => {
                        let terminal = snapshot.status.is_terminal();
                        yield Ok(snapshot);
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Current status without recording an access
    pub async fn snapshot(&self, run_id: Uuid) -> Result<RunStatus, RunError> {
        let state = pipeline_states::load_state(&self.db, run_id)
            .await?
            .ok_or(RunError::NotFound(run_id))?;
        Ok(state.snapshot())
    }

    /// Fail runs a previous process left unfinished; returns how many
    pub async fn recover_interrupted_runs(&self) -> Result<usize, RunError> {
        let failed = pipeline_states::fail_interrupted_runs(&self.db).await?;
        for state in &failed {
            let processing_ms = state
                .completed_at
                .map(|end| (end - state.started_at).num_milliseconds().max(0) as u64)
                .unwrap_or(0);
            if let Err(e) = runs::finalize_run(&self.db, state, processing_ms).await {
                warn!(run_id = %state.run_id, error = %e, "Failed to write run record");
            }
            self.emit_failed(state);
        }
        if !failed.is_empty() {
            warn!(count = failed.len(), "Marked interrupted runs as failed");
        }
        Ok(failed.len())
    }
}

/// `Err(Cancelled)` once the run's token has fired
fn checkpoint(token: &CancellationToken) -> Result<(), StageError> {
    if token.is_cancelled() {
        Err(StageError::Cancelled)
    } else {
        Ok(())
    }
}
