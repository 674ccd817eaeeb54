//! Framecap server - upload videos, follow progress, download the archive.
//!
//! Wires up:
//! - The configured pipeline (ffmpeg extractor, shared transcriber, fonts)
//! - The batch orchestrator
//! - The HTTP inbound adapter

use framecap::adapters::http::{router, AppState};
use framecap::{BatchOrchestrator, PipelineConfig, ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = ServerConfig::from_env();
    let config = PipelineConfig::from_env();

    // 1. Pipeline; the transcription model is loaded once for the process
    let pipeline = match config.build_pipeline() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to set up the transcriber: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Application Services
    let orchestrator = Arc::new(BatchOrchestrator::new(pipeline, config.max_concurrent_jobs));

    if let Err(e) = tokio::fs::create_dir_all(&server.data_dir).await {
        error!("Failed to create data dir {}: {}", server.data_dir.display(), e);
        std::process::exit(1);
    }

    // 3. HTTP Layer
    let state = Arc::new(AppState::new(orchestrator, &server.data_dir));
    let app = router(state);

    // 4. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", server.addr, server.port))
        .await
        .expect("Failed to bind TCP listener");
    info!("Listening at {}:{}", server.addr, server.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
