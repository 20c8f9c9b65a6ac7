//! Stage 6: EXPLAINING
//!
//! Reasons come from the LLM when one is configured and answers usably,
//! otherwise from templates. This stage does not fail on LLM problems.

use super::{checkpoint, PipelineOrchestrator};
use crate::models::{PipelineState, PipelineStatus};
use crate::services::StageError;
use tokio_util::sync::CancellationToken;

impl PipelineOrchestrator {
    pub(super) async fn phase_explaining(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.enter(state, PipelineStatus::Explaining, token).await?;

        let seed = state
            .candidate_pool
            .first()
            .cloned()
            .ok_or_else(|| StageError::Validation("candidate pool has no seed".to_string()))?;
        let playlist = std::mem::take(&mut state.playlist);
        let mood = state.input.mood_bias();

        let explained = self
            .run_stage(PipelineStatus::Explaining, async {
                Ok(self.explainer.explain(&seed, playlist, mood).await)
            })
            .await?;
        checkpoint(token)?;

        state.playlist = explained;
        Ok(())
    }
}
