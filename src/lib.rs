pub mod api;
pub mod config;
pub mod db;
pub mod engine_state;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use engine_state::EngineState;
use pipeline::Orchestrator;

/// Start the review engine: tracing, database, crash recovery, HTTP API.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let db_path = config::default_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Open once so migrations run before anything else touches the file.
    db::open_database(&db_path)?;

    let engine = Arc::new(EngineState::new(db_path));

    // Re-enter runs interrupted by a previous crash (stale leases).
    let recovered = Orchestrator::new(engine.clone()).recover_interrupted()?;
    if recovered > 0 {
        tracing::info!(recovered, "Recovered interrupted runs");
    }

    let addr = config::bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Review API listening");

    axum::serve(listener, api::api_router(engine)).await?;
    Ok(())
}
