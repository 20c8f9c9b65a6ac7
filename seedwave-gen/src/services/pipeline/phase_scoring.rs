//! Stage 4: SCORING

use super::{checkpoint, PipelineOrchestrator};
use crate::models::{EnrichedTrack, PipelineState, PipelineStatus};
use crate::services::scorer::{self, FeatureVectors};
use crate::services::vector_index::VectorIndex;
use crate::services::StageError;
use tokio_util::sync::CancellationToken;

impl PipelineOrchestrator {
    pub(super) async fn phase_scoring(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<(), StageError> {
        self.enter(state, PipelineStatus::Scoring, token).await?;

        let Some((seed, candidates)) = state.candidate_pool.split_first() else {
            return Err(StageError::Validation("candidate pool has no seed".to_string()));
        };

        let scored = self
            .run_stage(PipelineStatus::Scoring, async {
                let vectors = self.feature_vectors(seed, candidates).await;
                Ok(scorer::score(
                    seed,
                    candidates,
                    state.input.preferences.as_ref(),
                    &vectors,
                ))
            })
            .await?;
        checkpoint(token)?;

        if let Some(best) = scored.first() {
            tracing::debug!(
                run_id = %state.run_id,
                scored = scored.len(),
                best = %best.track.track.title,
                best_overall = best.scores.overall,
                "Scored candidates"
            );
        }
        state.scored_candidates = scored;
        Ok(())
    }

    /// Feature vectors of the seed and candidates, when an index is configured
    ///
    /// Lookup failures only drop the vector dimension for that track.
    async fn feature_vectors(
        &self,
        seed: &EnrichedTrack,
        candidates: &[EnrichedTrack],
    ) -> FeatureVectors {
        let mut vectors = FeatureVectors::new();
        let Some(index) = &self.vectors else {
            return vectors;
        };

        // Without a seed vector no candidate can use the dimension
        match lookup_vector(index.as_ref(), &seed.track.id).await {
            Some(vector) => vectors.insert(seed.track.id.clone(), vector),
            None => return vectors,
        };

        for candidate in candidates {
            let id = &candidate.track.id;
            if vectors.contains_key(id) {
                continue;
            }
            if let Some(vector) = lookup_vector(index.as_ref(), id).await {
                vectors.insert(id.clone(), vector);
            }
        }
        vectors
    }
}

async fn lookup_vector(index: &dyn VectorIndex, id: &str) -> Option<Vec<f32>> {
    if id.is_empty() {
        return None;
    }
    match index.feature_vector(id).await {
        Ok(vector) => vector,
        Err(e) => {
            tracing::warn!(id = id, error = %e, "Feature vector lookup failed");
            None
        }
    }
}
