//! Stage 5: CURATING

use super::{checkpoint, PipelineOrchestrator};
use crate::models::{PipelineState, PipelineStatus};
use crate::services::curator;
use crate::services::StageError;
use tokio_util::sync::CancellationToken;

impl PipelineOrchestrator {
    pub(super) async fn phase_curating(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.enter(state, PipelineStatus::Curating, token).await?;

        let target = state.input.playlist_size.tracks();
        let playlist = curator::curate(&state.scored_candidates, target);
        checkpoint(token)?;

        if playlist.len() < target {
            tracing::warn!(
                run_id = %state.run_id,
                selected = playlist.len(),
                target = target,
                "Fewer candidates than requested tracks"
            );
        }
        state.playlist = playlist;
        Ok(())
    }
}
