//! Batch Binary - process local videos without the HTTP server.
//!
//! Usage: `framecap-batch <video>...`
//!
//! Environment Variables:
//! - ARCHIVE_PATH: where to write the archive (default: ./screenshots.zip)
//! - Every pipeline setting read by `PipelineConfig::from_env`

use framecap::adapters::events::{BatchEvent, EventHub};
use framecap::domain::media::{is_supported_container, InputVideo};
use framecap::{BatchOrchestrator, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env();
    let archive_path = PathBuf::from(
        std::env::var("ARCHIVE_PATH").unwrap_or_else(|_| String::from("screenshots.zip")),
    );

    let mut videos = Vec::new();
    for arg in std::env::args().skip(1) {
        let path = PathBuf::from(&arg);
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            warn!("Skipping {}: not a file name", arg);
            continue;
        };
        if !is_supported_container(&name) {
            warn!("Skipping {}: only mp4, avi and mov videos are accepted", arg);
            continue;
        }
        videos.push(InputVideo::from_file(name, path));
    }
    if videos.is_empty() {
        eprintln!("usage: framecap-batch <video.mp4|video.avi|video.mov>...");
        std::process::exit(2);
    }

    let pipeline = match config.build_pipeline() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to set up the transcriber: {}", e);
            std::process::exit(1);
        }
    };
    let orchestrator = BatchOrchestrator::new(pipeline, config.max_concurrent_jobs);

    let batch_root = match tempfile::Builder::new().prefix("framecap-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Failed to create batch dir: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            ctrl_c.cancel();
        }
    });

    // Print each job as it finishes
    let hub = Arc::new(EventHub::with_capacity(videos.len() * 3 + 2));
    let mut events = hub.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BatchEvent::Finished {
                    result,
                    completed,
                    total,
                    ..
                } => println!("[{}/{}] {:?}: {}", completed, total, result.status, result.message),
                BatchEvent::Completed { .. } | BatchEvent::Failed { .. } => break,
                _ => {}
            }
        }
    });

    let result = orchestrator.run(batch_root.path(), videos, hub, cancel).await;
    let _ = printer.await;

    let code = match result {
        Ok(batch) => match batch.archive.as_deref() {
            Some(archive) => match move_file(archive, &archive_path).await {
                Ok(()) => {
                    info!(
                        "{} succeeded, {} failed; archive written to {}",
                        batch.succeeded(),
                        batch.failed(),
                        archive_path.display()
                    );
                    0
                }
                Err(e) => {
                    error!("Failed to write {}: {}", archive_path.display(), e);
                    1
                }
            },
            None => {
                error!("Batch finished without an archive");
                1
            }
        },
        Err(e) => {
            error!("Batch failed: {}", e);
            1
        }
    };

    drop(batch_root);
    std::process::exit(code);
}

/// Rename, falling back to copy when the target is on another filesystem.
async fn move_file(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await.map(|_| ())
}
