//! Snapshot of a batch, folded from its event stream.

use super::BatchEvent;
use crate::domain::jobs::JobStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Queued,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub video: String,
    pub status: ProgressStatus,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    pub jobs: Vec<JobProgress>,
    pub completed: usize,
    pub total: usize,
    pub fraction_complete: f64,
    pub archive_ready: bool,
    /// Set when the batch itself failed
    pub error: Option<String>,
}

impl BatchProgress {
    pub fn new(videos: impl IntoIterator<Item = String>) -> Self {
        let jobs: Vec<JobProgress> = videos
            .into_iter()
            .map(|video| JobProgress {
                video,
                status: ProgressStatus::Queued,
                message: String::new(),
            })
            .collect();
        Self {
            total: jobs.len(),
            jobs,
            ..Default::default()
        }
    }

    /// Whether the batch reached an end, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.archive_ready || self.error.is_some()
    }

    /// Row for the job at `index`, grown to fit an index past the batch size.
    fn job_mut(&mut self, index: usize, video: &str) -> &mut JobProgress {
        while self.jobs.len() <= index {
            self.jobs.push(JobProgress {
                video: video.to_string(),
                status: ProgressStatus::Queued,
                message: String::new(),
            });
        }
        self.total = self.total.max(self.jobs.len());
        &mut self.jobs[index]
    }

    pub fn apply(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::Queued { index, video } => {
                self.job_mut(*index, video);
            }
            BatchEvent::Started { index, video } => {
                let job = self.job_mut(*index, video);
                job.status = ProgressStatus::Running;
            }
            BatchEvent::Finished {
                index,
                result,
                completed,
                total,
            } => {
                let job = self.job_mut(*index, &result.video);
                job.status = match result.status {
                    JobStatus::Success => ProgressStatus::Done,
                    JobStatus::Failed => ProgressStatus::Failed,
                };
                job.message = result.message.clone();
                self.completed = *completed;
                self.total = *total;
                self.fraction_complete = if *total == 0 {
                    1.0
                } else {
                    *completed as f64 / *total as f64
                };
            }
            BatchEvent::Completed { .. } => {
                self.fraction_complete = 1.0;
                self.archive_ready = true;
            }
            BatchEvent::Failed { message } => {
                self.error = Some(message.clone());
            }
        }
    }
}
