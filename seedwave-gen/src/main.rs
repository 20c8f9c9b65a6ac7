//! seedwave-gen - Seed-track playlist generation service
//!
//! Turns a free-text track query into a curated, explained playlist via a
//! persisted multi-stage pipeline. Runs are created over HTTP and observed
//! by polling, SSE status streams, or the lifecycle event stream.

use anyhow::{Context, Result};
use clap::Parser;
use seedwave_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seedwave_gen::services::llm::{CompletionOptions, LlmProvider, OpenAiProvider};
use seedwave_gen::services::{
    ArchiveStore, FileArchive, InMemoryVectorIndex, LastFmClient, MusicBrainzClient,
    PipelineOrchestrator, PipelineServices, RateLimiter, ResponseCache, SqliteResponseCache,
    VectorIndex,
};
use seedwave_gen::AppState;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

/// Command-line arguments for seedwave-gen
#[derive(Parser, Debug)]
#[command(name = "seedwave-gen")]
#[command(about = "Seed-track playlist generation service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and run archive
    #[arg(short, long, env = "SEEDWAVE_ROOT")]
    root_folder: Option<String>,

    /// Address to listen on (overrides the TOML `bind_address`)
    #[arg(short, long, env = "SEEDWAVE_BIND")]
    bind: Option<String>,

    /// Explicit TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = seedwave_common::config::load_toml_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting seedwave-gen (playlist generation) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Root folder and database
    let root_folder = seedwave_common::config::resolve_root_folder(
        args.root_folder.as_deref(),
        "SEEDWAVE_ROOT",
        &toml_config,
    );
    let db_path = seedwave_common::config::prepare_root_folder(&root_folder)?;
    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", db_path.display());

    let db_pool = seedwave_gen::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 2: Shared source plumbing
    let response_cache = Arc::new(SqliteResponseCache::new(db_pool.clone()));
    match response_cache.evict_expired().await {
        Ok(0) => {}
        Ok(n) => info!("Evicted {} expired cache entries", n),
        Err(e) => warn!("Cache eviction failed: {}", e),
    }
    let cache: Arc<dyn ResponseCache> = response_cache;
    let limiter = Arc::new(RateLimiter::with_defaults());

    let lastfm_key = seedwave_gen::config::resolve_lastfm_api_key(&db_pool, &toml_config)
        .await?
        .unwrap_or_default();

    let catalog = Arc::new(MusicBrainzClient::new(
        Arc::clone(&limiter),
        Arc::clone(&cache),
        toml_config.musicbrainz_contact.as_deref(),
    )?);
    let similarity = Arc::new(LastFmClient::new(lastfm_key, Arc::clone(&limiter), Arc::clone(&cache))?);

    // Step 3: Optional collaborators
    let mut llm_options = CompletionOptions::default();
    let llm: Option<Arc<dyn LlmProvider>> = toml_config.llm.as_ref().map(|cfg| {
        info!(model = %cfg.model, base_url = %cfg.base_url, "LLM explanations enabled");
        llm_options.timeout = Duration::from_secs(cfg.timeout_secs);
        Arc::new(OpenAiProvider::new(&cfg.base_url, &cfg.model, cfg.api_key.clone()))
            as Arc<dyn LlmProvider>
    });

    let vectors: Option<Arc<dyn VectorIndex>> = match &toml_config.vector_index_path {
        Some(path) => match InMemoryVectorIndex::load(path).await {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                warn!("Vector index unavailable ({}): {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let archive: Arc<dyn ArchiveStore> = Arc::new(FileArchive::new(root_folder.join("archive")));

    // Step 4: Pipeline
    let event_bus = EventBus::new(100);
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        db_pool.clone(),
        event_bus.clone(),
        PipelineServices {
            catalog,
            similarity,
            llm,
            llm_options,
            vectors,
            archive: Some(archive),
        },
        seedwave_gen::config::pipeline_settings(&toml_config),
    ));

    let state = AppState::new(db_pool, event_bus, Arc::clone(&orchestrator));
    seedwave_gen::spawn_failure_tracker(&state);

    // Runs left unfinished by a previous process can never complete
    orchestrator.recover_interrupted_runs().await?;

    let app = seedwave_gen::build_router(state);

    let bind_address = args
        .bind
        .or_else(|| toml_config.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
