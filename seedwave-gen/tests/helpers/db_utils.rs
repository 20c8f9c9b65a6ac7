//! Database and orchestrator utilities

use seedwave_common::events::EventBus;
use seedwave_gen::models::RunStatus;
use seedwave_gen::services::llm::{CompletionOptions, LlmProvider};
use seedwave_gen::services::{
    CatalogSource, PipelineOrchestrator, PipelineServices, PipelineSettings, SimilaritySource,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// In-memory database with every seedwave-gen table
///
/// A single connection keeps the in-memory database alive and shared.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    seedwave_gen::db::init_tables(&pool)
        .await
        .expect("Failed to initialize tables");
    pool
}

pub fn create_test_orchestrator(
    pool: SqlitePool,
    event_bus: EventBus,
    catalog: Arc<dyn CatalogSource>,
    similarity: Arc<dyn SimilaritySource>,
    llm: Option<Arc<dyn LlmProvider>>,
) -> Arc<PipelineOrchestrator> {
    Arc::new(PipelineOrchestrator::new(
        pool,
        event_bus,
        PipelineServices {
            catalog,
            similarity,
            llm,
            llm_options: CompletionOptions::default(),
            vectors: None,
            archive: None,
        },
        PipelineSettings {
            stage_timeout: Duration::from_secs(10),
            status_interval: Duration::from_millis(20),
        },
    ))
}

/// Poll until the run is terminal (panics after 5 s)
pub async fn wait_for_terminal(orchestrator: &PipelineOrchestrator, run_id: Uuid) -> RunStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = orchestrator.snapshot(run_id).await.expect("run exists");
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "run {} still {} after 5s",
            run_id,
            snapshot.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the run's background task has exited (panics after 5 s)
pub async fn wait_until_idle(orchestrator: &PipelineOrchestrator, run_id: Uuid) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.is_running(run_id).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run task did not stop");
}
