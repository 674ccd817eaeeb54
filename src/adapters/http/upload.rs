use super::{AppState, BatchHandle};
use crate::adapters::events::{BatchEvent, BatchProgress, EventHub};
use crate::domain::media::{is_supported_container, sanitize_upload_name, InputVideo};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, Redirect},
    BoxError,
};
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// Handler that accepts a multipart form upload, streams each video to the
// batch's upload folder and starts processing in the background.
pub async fn upload_media(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Redirect, (StatusCode, String)> {
    let id = Uuid::new_v4();
    let batch_dir = state.data_dir.join(id.to_string());
    let upload_dir = batch_dir.join("uploads");
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let mut videos = Vec::new();
    let staged = async {
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err((StatusCode::BAD_REQUEST, e.to_string())),
            };
            let file_name = if let Some(file_name) = field.file_name() {
                file_name.to_owned()
            } else {
                continue;
            };

            let name = sanitize_upload_name(&file_name)
                .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid file name {file_name:?}")))?;
            if !is_supported_container(&name) {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("{name}: only mp4, avi and mov videos are accepted"),
                ));
            }

            // the index keeps same-named uploads apart on disk
            let path = upload_dir.join(format!("{}_{}", videos.len(), name));
            let size = save_upload(&path, field).await?;
            debug!(path = %path.display(), bytes = size, "upload saved");
            videos.push(InputVideo::from_file(name, path));
        }
        if videos.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "no videos uploaded".to_owned()));
        }
        Ok::<(), (StatusCode, String)>(())
    }
    .await;

    if let Err(rejection) = staged {
        if let Err(e) = tokio::fs::remove_dir_all(&batch_dir).await {
            warn!(path = %batch_dir.display(), error = %e, "could not remove rejected upload");
        }
        return Err(rejection);
    }

    start_batch(&state, id, batch_dir, videos).await;
    Ok(Redirect::to(&format!("/batches/{id}")))
}

/// Register the batch and run it on a background task.
pub async fn start_batch(state: &Arc<AppState>, id: Uuid, dir: impl AsRef<Path>, videos: Vec<InputVideo>) {
    let dir = dir.as_ref().to_path_buf();
    let cancel = CancellationToken::new();
    // room for every queued/started/finished event plus the final one
    let hub = Arc::new(EventHub::with_capacity(videos.len() * 3 + 2));
    let events = hub.subscribe();

    state.batches.write().await.insert(
        id,
        BatchHandle {
            progress: BatchProgress::new(videos.iter().map(|v| v.name.clone())),
            cancel: cancel.clone(),
            dir: dir.clone(),
        },
    );
    info!(batch = %id, videos = videos.len(), "batch accepted");

    tokio::spawn(track_progress(state.clone(), id, events));

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(&dir, videos, hub, cancel).await {
            error!(batch = %id, error = %e, "batch failed");
        }
    });
}

/// Fold a batch's events into its progress snapshot until it finishes.
async fn track_progress(state: Arc<AppState>, id: Uuid, mut events: broadcast::Receiver<BatchEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(batch = %id, skipped, "progress listener fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let mut batches = state.batches.write().await;
        let Some(handle) = batches.get_mut(&id) else {
            // batch deleted
            break;
        };
        handle.progress.apply(&event);
        if handle.progress.is_finished() {
            break;
        }
    }
}

/// Write one uploaded video to `path`, returning the number of bytes stored.
pub(crate) async fn save_upload<S, E>(path: &Path, body: S) -> Result<u64, (StatusCode, String)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let reader = StreamReader::new(body.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));
    futures::pin_mut!(reader);

    let written = async {
        let mut file = BufWriter::new(File::create(path).await?);
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok::<_, io::Error>(written)
    }
    .await;

    written.map_err(|err| {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        warn!(path = %path.display(), error = %err, "upload not stored");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not store upload {name}: {err}"),
        )
    })
}

pub async fn root() -> Html<&'static str> {
    Html(
        r#"
        <!doctype html>
        <html>
            <head>
                <title>Captioned screenshots</title>
            </head>
            <body>
                <h1>Upload videos (mp4, avi, mov)</h1>
                <form action="/upload" method="post" enctype="multipart/form-data">
                    <div>
                        <label>
                            Videos:
                            <input type="file" name="file" accept=".mp4,.avi,.mov" multiple>
                        </label>
                    </div>
                    <div>
                        <input type="submit" value="Process videos">
                    </div>
                </form>
            </body>
        </html>
        "#,
    )
}
