use super::AppState;
use crate::adapters::events::BatchProgress;
use crate::application::orchestrator::ARCHIVE_NAME;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchProgress>, StatusCode> {
    let batches = state.batches.read().await;
    let handle = batches.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(handle.progress.clone()))
}

/// Stream the finished archive. Only available once every job terminated.
pub async fn download_archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let archive = {
        let batches = state.batches.read().await;
        let handle = batches
            .get(&id)
            .ok_or((StatusCode::NOT_FOUND, format!("unknown batch {id}")))?;
        if let Some(error) = &handle.progress.error {
            return Err((StatusCode::INTERNAL_SERVER_ERROR, error.clone()));
        }
        if !handle.progress.archive_ready {
            return Err((
                StatusCode::CONFLICT,
                format!(
                    "batch still running: {}/{} videos done",
                    handle.progress.completed, handle.progress.total
                ),
            ));
        }
        handle.dir.join(ARCHIVE_NAME)
    };

    let file = File::open(&archive)
        .await
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_NAME}\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub async fn cancel_batch(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> StatusCode {
    match state.batches.read().await.get(&id) {
        Some(handle) => {
            info!(batch = %id, "cancelling batch");
            handle.cancel.cancel();
            StatusCode::ACCEPTED
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Forget a batch and remove its scratch space, cancelling it if needed.
pub async fn delete_batch(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> StatusCode {
    let Some(handle) = state.batches.write().await.remove(&id) else {
        return StatusCode::NOT_FOUND;
    };
    handle.cancel.cancel();
    if let Err(e) = tokio::fs::remove_dir_all(&handle.dir).await {
        warn!(batch = %id, error = %e, "could not remove batch dir");
    }
    StatusCode::NO_CONTENT
}
