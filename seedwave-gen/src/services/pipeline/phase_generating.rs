//! Stage 3: GENERATING
//!
//! Candidate pool discovery. The enriched seed stays at index 0.

use super::{checkpoint, PipelineOrchestrator};
use crate::models::{PipelineState, PipelineStatus};
use crate::services::StageError;
use tokio_util::sync::CancellationToken;

impl PipelineOrchestrator {
    pub(super) async fn phase_generating(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.enter(state, PipelineStatus::Generating, token).await?;

        let seed = state
            .candidate_pool
            .first()
            .cloned()
            .ok_or_else(|| StageError::Validation("candidate pool has no seed".to_string()))?;
        let target = state.input.playlist_size.tracks();

        let pool = self
            .run_stage(
                PipelineStatus::Generating,
                self.generator.generate(seed, target, token),
            )
            .await?;
        checkpoint(token)?;

        tracing::info!(
            run_id = %state.run_id,
            candidates = pool.len().saturating_sub(1),
            target = target,
            "Generated candidate pool"
        );
        state.candidate_pool = pool;
        Ok(())
    }
}
