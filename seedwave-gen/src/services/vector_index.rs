//! Feature-vector index (optional candidate strategy and scoring dimension)

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::services::StageError;

/// Neighbour returned by [`VectorIndex::nearest`]
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Feature vector for a catalog id, if indexed
    async fn feature_vector(&self, id: &str) -> Result<Option<Vec<f32>>, StageError>;

    /// Up to `k` nearest ids by cosine similarity, best first
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, StageError>;
}

/// Cosine similarity in [-1, 1]; 0 for mismatched or zero-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Deserialize)]
struct VectorFileEntry {
    id: String,
    vector: Vec<f32>,
}

/// Brute-force index held in memory
#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: HashMap<String, Vec<f32>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(id.into(), vector);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Load `[{"id": "...", "vector": [..]}, ...]`
    pub async fn load(path: &Path) -> seedwave_common::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let entries: Vec<VectorFileEntry> = serde_json::from_str(&raw)?;

        let mut index = Self::new();
        for entry in entries {
            index.insert(entry.id, entry.vector);
        }
        info!(path = %path.display(), vectors = index.len(), "Loaded vector index");
        Ok(index)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn feature_vector(&self, id: &str) -> Result<Option<Vec<f32>>, StageError> {
        Ok(self.vectors.get(id).cloned())
    }

    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, StageError> {
        let mut matches: Vec<VectorMatch> = self
            .vectors
            .iter()
            .map(|(id, v)| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, v),
            })
            .collect();

        // Ties broken by id so results are deterministic
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity() {
        let mut index = InMemoryVectorIndex::new();
        index.insert("seed", vec![1.0, 0.0, 0.0]);
        index.insert("close", vec![0.9, 0.1, 0.0]);
        index.insert("far", vec![0.0, 0.0, 1.0]);

        let seed = index.feature_vector("seed").await.unwrap().unwrap();
        let nearest = index.nearest(&seed, 2).await.unwrap();
        assert_eq!(nearest.len(), 2);
        assert_eq!(nearest[0].id, "seed");
        assert_eq!(nearest[1].id, "close");

        assert!(index.feature_vector("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        std::fs::write(
            &path,
            r#"[{"id": "a", "vector": [1.0, 2.0]}, {"id": "b", "vector": [0.5, 0.5]}]"#,
        )
        .unwrap();

        let index = InMemoryVectorIndex::load(&path).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.feature_vector("b").await.unwrap(), Some(vec![0.5, 0.5]));
    }
}
