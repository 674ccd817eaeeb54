//! Fans a batch of videos out to a bounded pool of jobs and packages whatever
//! succeeded into one archive.

use super::job::{Pipeline, VideoJob};
use crate::adapters::archive::package_dir;
use crate::adapters::events::{BatchEvent, EventHub};
use crate::domain::jobs::{BatchResult, JobResult};
use crate::domain::media::InputVideo;
use crate::error::BatchError;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const ARCHIVE_NAME: &str = "screenshots.zip";
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 5;

pub struct BatchOrchestrator {
    pipeline: Pipeline,
    max_concurrent: usize,
}

impl BatchOrchestrator {
    pub fn new(pipeline: Pipeline, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Process every video and write `<batch_root>/screenshots.zip`.
    ///
    /// Job failures are recorded in the returned `BatchResult`; only
    /// workspace and packaging problems fail the batch as a whole. A
    /// cancelled batch still packages the jobs that finished first.
    pub async fn run(
        &self,
        batch_root: &Path,
        videos: Vec<InputVideo>,
        events: Arc<EventHub>,
        cancel: CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        match self.process(batch_root, videos, &events, cancel).await {
            Ok(result) => {
                if let Some(archive) = &result.archive {
                    events.publish(BatchEvent::Completed {
                        archive: archive.clone(),
                    });
                }
                Ok(result)
            }
            Err(e) => {
                error!(batch = %batch_root.display(), error = %e, "batch failed");
                events.publish(BatchEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        batch_root: &Path,
        videos: Vec<InputVideo>,
        events: &Arc<EventHub>,
        cancel: CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        let outputs_root = batch_root.join("outputs");
        let work_root = batch_root.join("work");
        tokio::fs::create_dir_all(&outputs_root).await?;
        tokio::fs::create_dir_all(&work_root).await?;

        let total = videos.len();
        info!(batch = %batch_root.display(), videos = total, workers = self.max_concurrent, "starting batch");

        let names: Vec<String> = videos.iter().map(|v| v.name.clone()).collect();
        let folders = output_folders(&videos);
        for (index, video) in names.iter().enumerate() {
            events.publish(BatchEvent::Queued {
                index,
                video: video.clone(),
            });
        }

        let slots = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for (index, (video, folder)) in videos.into_iter().zip(folders).enumerate() {
            let slots = slots.clone();
            let events = events.clone();
            let cancel = cancel.clone();
            let pipeline = self.pipeline.clone();
            let work_root = work_root.clone();
            let outputs_root = outputs_root.clone();

            tasks.spawn(async move {
                let name = video.name.clone();
                let _slot = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return (index, JobResult::failed(name.clone(), format!("{name}: cancelled")));
                    }
                    slot = slots.acquire_owned() => slot,
                };

                events.publish(BatchEvent::Started {
                    index,
                    video: name.clone(),
                });
                let job = VideoJob::new(video, folder, pipeline);
                let result = AssertUnwindSafe(job.run(&work_root, &outputs_root, &cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        error!(video = %name, reason = %reason, "job panicked");
                        JobResult::failed(name.clone(), format!("{name}: job panicked: {reason}"))
                    });
                (index, result)
            });
        }

        let mut results: Vec<Option<JobResult>> = vec![None; total];
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    completed += 1;
                    info!(video = %result.video, status = ?result.status, completed, total, "{}", result.message);
                    events.publish(BatchEvent::Finished {
                        index,
                        result: result.clone(),
                        completed,
                        total,
                    });
                    results[index] = Some(result);
                }
                Err(e) => error!(error = %e, "job task aborted"),
            }
        }

        // a task that died outside the job boundary still gets a result
        let jobs: Vec<JobResult> = results
            .into_iter()
            .zip(names)
            .map(|(result, name)| {
                result.unwrap_or_else(|| JobResult::failed(name.clone(), format!("{name}: job aborted")))
            })
            .collect();

        if let Err(e) = tokio::fs::remove_dir_all(&work_root).await {
            warn!(path = %work_root.display(), error = %e, "could not remove batch work dir");
        }

        let archive = package_dir(&outputs_root, &batch_root.join(ARCHIVE_NAME)).await?;

        let result = BatchResult {
            jobs,
            archive: Some(archive),
        };
        info!(
            batch = %batch_root.display(),
            succeeded = result.succeeded(),
            failed = result.failed(),
            "batch complete"
        );
        Ok(result)
    }
}

/// One output folder per video: the file stem, with `_2`, `_3`, ... appended
/// when an earlier video of the batch already took that name.
pub fn output_folders(videos: &[InputVideo]) -> Vec<String> {
    let mut taken = HashSet::new();
    videos
        .iter()
        .map(|video| {
            let base = video.basename();
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
