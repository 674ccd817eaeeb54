//! Typed failure reasons for every stage of the pipeline.
//!
//! Per-job errors end up inside a `JobResult`; only `BatchError` ever leaves
//! the orchestrator.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// The external transcoder could not produce frames or audio.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("input video is empty")]
    EmptyInput,

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{stage} extraction exited with {status}: {stderr}")]
    ToolFailed {
        stage: &'static str,
        status: ExitStatus,
        stderr: String,
    },

    #[error("extractor produced no frames")]
    NoFrames,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to load audio: {0}")]
    Audio(String),

    #[error("transcription backend failed: {0}")]
    Backend(String),

    #[error("transcription timed out after {0:?}")]
    TimedOut(Duration),

    #[error("could not decode transcript: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Captioning a single frame failed. Never aborts a job.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("packaging task failed: {0}")]
    Join(String),
}

/// Why a single video job ended in the `failed` state.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("workspace error: {0}")]
    Workspace(#[from] io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("job panicked: {0}")]
    Panicked(String),
}

/// Batch-wide failures. Individual job failures never show up here.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not prepare batch workspace: {0}")]
    Workspace(#[from] io::Error),

    #[error("packaging failed: {0}")]
    Packaging(#[from] PackagingError),
}
