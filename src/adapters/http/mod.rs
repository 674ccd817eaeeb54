//! HTTP inbound adapter.
//!
//! Browsers upload a batch of videos, poll its progress and download the
//! finished archive.

pub mod batches;
pub mod upload;

use crate::adapters::events::BatchProgress;
use crate::application::orchestrator::BatchOrchestrator;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A batch known to the server.
#[derive(Debug)]
pub struct BatchHandle {
    pub progress: BatchProgress,
    pub cancel: CancellationToken,
    /// Scratch space: uploads, outputs and the archive
    pub dir: PathBuf,
}

pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
    pub data_dir: PathBuf,
    pub batches: RwLock<HashMap<Uuid, BatchHandle>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            data_dir: data_dir.into(),
            batches: RwLock::new(HashMap::new()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(upload::root))
        .route("/upload", post(upload::upload_media))
        .route(
            "/batches/:id",
            get(batches::get_progress).delete(batches::delete_batch),
        )
        .route("/batches/:id/archive", get(batches::download_archive))
        .route("/batches/:id/cancel", post(batches::cancel_batch))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}
