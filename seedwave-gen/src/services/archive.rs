//! Cold storage for completed runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::models::PipelineState;

/// `runs/YYYY/MM/DD/{run_id}.json`
pub fn archive_key(run_id: Uuid, completed_at: DateTime<Utc>) -> String {
    format!("runs/{}/{}.json", completed_at.format("%Y/%m/%d"), run_id)
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn put(&self, key: &str, state: &PipelineState) -> seedwave_common::Result<()>;
}

/// Archive under a local directory, one JSON file per run
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ArchiveStore for FileArchive {
    async fn put(&self, key: &str, state: &PipelineState) -> seedwave_common::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&path, body).await?;
        debug!(run_id = %state.run_id, path = %path.display(), "Archived run");
        Ok(())
    }
}
