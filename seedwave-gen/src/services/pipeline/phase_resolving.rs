//! Stage 1: RESOLVING
//!
//! Free-text query → one canonical track.

use super::{checkpoint, PipelineOrchestrator};
use crate::models::{PipelineState, PipelineStatus};
use crate::services::StageError;
use tokio_util::sync::CancellationToken;

impl PipelineOrchestrator {
    pub(super) async fn phase_resolving(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.enter(state, PipelineStatus::Resolving, token).await?;

        let query = state.input.query.clone();
        let resolved = self
            .run_stage(PipelineStatus::Resolving, self.resolver.resolve(&query))
            .await?;
        checkpoint(token)?;

        tracing::info!(
            run_id = %state.run_id,
            title = %resolved.title,
            artist = %resolved.artist,
            id = %resolved.id,
            "Resolved seed track"
        );
        state.resolved_track = Some(resolved);
        Ok(())
    }
}
