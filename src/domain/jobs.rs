use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of one video job. Stages only move forward; `Failed` can be
/// entered from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Extracting,
    Transcribing,
    AligningAndRendering,
    Packaged,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Packaged | JobState::Failed)
    }

    fn next(self) -> Option<JobState> {
        match self {
            JobState::Received => Some(JobState::Extracting),
            JobState::Extracting => Some(JobState::Transcribing),
            JobState::Transcribing => Some(JobState::AligningAndRendering),
            JobState::AligningAndRendering => Some(JobState::Packaged),
            JobState::Packaged | JobState::Failed => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobState::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Received => "received",
            JobState::Extracting => "extracting",
            JobState::Transcribing => "transcribing",
            JobState::AligningAndRendering => "aligning_and_rendering",
            JobState::Packaged => "packaged",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// Outcome of one video job, used only for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Original upload name
    pub video: String,
    pub status: JobStatus,
    pub message: String,
    /// Output folder contributed to the batch (success only)
    pub output_dir: Option<PathBuf>,
    pub frames: usize,
    pub captioned_frames: usize,
    /// Frames left uncaptioned because rendering them failed
    pub render_failures: usize,
    /// Non-fatal problems such as font fallbacks
    pub warnings: Vec<String>,
}

impl JobResult {
    pub fn failed(video: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            status: JobStatus::Failed,
            message: message.into(),
            output_dir: None,
            frames: 0,
            captioned_frames: 0,
            render_failures: 0,
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Every job's outcome plus the packaged archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// One result per input video, in submission order
    pub jobs: Vec<JobResult>,
    /// Set once packaging succeeded
    pub archive: Option<PathBuf>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }
}
