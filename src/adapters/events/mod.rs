//! Batch progress events, consumed by the upload UI.

use crate::domain::jobs::JobResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod hub;
pub mod progress;

pub use hub::EventHub;
pub use progress::{BatchProgress, JobProgress, ProgressStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// `index` is the job's position in the submitted batch.
    Queued {
        index: usize,
        video: String,
    },
    Started {
        index: usize,
        video: String,
    },
    /// A job reached a terminal state.
    Finished {
        index: usize,
        result: JobResult,
        completed: usize,
        total: usize,
    },
    /// Every job terminated and the archive is ready.
    Completed {
        archive: PathBuf,
    },
    /// Batch-level failure; no archive will be produced.
    Failed {
        message: String,
    },
}
