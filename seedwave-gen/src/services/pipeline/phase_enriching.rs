//! Stage 2: ENRICHING
//!
//! Tags, similar tracks, and similar artists for the seed. Individual
//! lookup failures degrade to empty fields; the stage itself only fails on
//! timeout.

use super::{checkpoint, PipelineOrchestrator};
use crate::models::{PipelineState, PipelineStatus};
use crate::services::StageError;
use tokio_util::sync::CancellationToken;

impl PipelineOrchestrator {
    pub(super) async fn phase_enriching(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.enter(state, PipelineStatus::Enriching, token).await?;

        let resolved = state
            .resolved_track
            .clone()
            .ok_or_else(|| StageError::Validation("no resolved track to enrich".to_string()))?;

        let seed = self
            .run_stage(PipelineStatus::Enriching, async {
                Ok(self.enricher.enrich(resolved).await)
            })
            .await?;
        checkpoint(token)?;

        tracing::debug!(
            run_id = %state.run_id,
            tags = seed.tags.len(),
            similar_tracks = seed.similar_track_ids.len(),
            similar_artists = seed.similar_artists.len(),
            "Enriched seed track"
        );
        state.candidate_pool = vec![seed];
        Ok(())
    }
}
