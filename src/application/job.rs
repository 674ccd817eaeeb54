//! The per-video pipeline: extract, transcribe, align and caption, then hand
//! the finished frame folder to the batch.
//!
//! A job owns a private scratch directory for its whole life. The directory
//! is a `TempDir`, so it is removed on every exit path, including early
//! returns, cancellation and panics.

use super::transcriber::SharedTranscriber;
use crate::domain::align::caption_at;
use crate::domain::font::FontChain;
use crate::domain::frames::scan_frames;
use crate::domain::jobs::{JobResult, JobState, JobStatus};
use crate::domain::media::{Frame, InputVideo, TranscriptSegment, VideoContent};
use crate::domain::overlay::{OverlayRenderer, OverlayStyle};
use crate::error::{ExtractionError, JobError};
use crate::ports::extractor::FrameExtractor;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a job needs besides its input. Shared by all jobs of a batch.
#[derive(Clone)]
pub struct Pipeline {
    pub extractor: Arc<dyn FrameExtractor>,
    pub transcriber: SharedTranscriber,
    pub fonts: FontChain,
    pub style: OverlayStyle,
}

/// Output of the render stage.
#[derive(Debug, Default)]
struct RenderSummary {
    frames: usize,
    captioned: usize,
    failures: usize,
    warnings: Vec<String>,
}

pub struct VideoJob {
    video: InputVideo,
    /// Folder name under the batch output root
    output_name: String,
    pipeline: Pipeline,
    state: JobState,
}

impl VideoJob {
    pub fn new(video: InputVideo, output_name: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            video,
            output_name: output_name.into(),
            pipeline,
            state: JobState::Received,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn transition(&mut self, to: JobState) {
        debug_assert!(
            self.state.can_transition(to),
            "illegal transition {} -> {}",
            self.state,
            to
        );
        info!(video = %self.video.name, from = %self.state, to = %to, "job state change");
        self.state = to;
    }

    /// Run the job to a terminal state. Never returns an error: every failure
    /// becomes a `failed` result.
    pub async fn run(
        mut self,
        work_root: &Path,
        outputs_root: &Path,
        cancel: &CancellationToken,
    ) -> JobResult {
        match self.execute(work_root, outputs_root, cancel).await {
            Ok((output_dir, summary)) => {
                self.transition(JobState::Packaged);
                let message = format!(
                    "processed {}: {} frames, {} captioned{}",
                    self.video.name,
                    summary.frames,
                    summary.captioned,
                    if summary.failures > 0 {
                        format!(", {} left uncaptioned after render errors", summary.failures)
                    } else {
                        String::new()
                    }
                );
                JobResult {
                    video: self.video.name.clone(),
                    status: JobStatus::Success,
                    message,
                    output_dir: Some(output_dir),
                    frames: summary.frames,
                    captioned_frames: summary.captioned,
                    render_failures: summary.failures,
                    warnings: summary.warnings,
                }
            }
            Err(e) => {
                warn!(video = %self.video.name, stage = %self.state, error = %e, "job failed");
                self.transition(JobState::Failed);
                JobResult::failed(self.video.name.clone(), format!("{}: {}", self.video.name, e))
            }
        }
    }

    async fn execute(
        &mut self,
        work_root: &Path,
        outputs_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, RenderSummary), JobError> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let work_dir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(work_root)?;
        let video_path = work_dir.path().join(self.video.staged_file_name());
        let frames_dir = work_dir.path().join("frames");
        let audio_path = work_dir.path().join("audio.wav");
        stage_input(&self.video.content, &video_path).await?;

        self.transition(JobState::Extracting);
        let extractor = self.pipeline.extractor.clone();
        guard(cancel, extractor.extract_frames(&video_path, &frames_dir)).await?;
        let frames = scan_frames(&frames_dir).await?;
        if frames.is_empty() {
            return Err(ExtractionError::NoFrames.into());
        }
        info!(video = %self.video.name, frames = frames.len(), "frames extracted");
        guard(cancel, extractor.extract_audio(&video_path, &audio_path)).await?;

        self.transition(JobState::Transcribing);
        let segments = guard(cancel, self.pipeline.transcriber.transcribe(&audio_path)).await?;
        info!(video = %self.video.name, segments = segments.len(), "transcribed");

        self.transition(JobState::AligningAndRendering);
        let summary = self.render(frames, segments, cancel.clone()).await?;

        let output_dir = outputs_root.join(&self.output_name);
        tokio::fs::rename(&frames_dir, &output_dir).await?;
        // work_dir (raw video copy, audio) is dropped and removed here
        Ok((output_dir, summary))
    }

    async fn render(
        &self,
        frames: Vec<Frame>,
        segments: Vec<TranscriptSegment>,
        cancel: CancellationToken,
    ) -> Result<RenderSummary, JobError> {
        let fonts = self.pipeline.fonts.clone();
        let style = self.pipeline.style.clone();
        let video = self.video.name.clone();

        tokio::task::spawn_blocking(move || {
            let (font, warnings) = fonts.resolve();
            let renderer = OverlayRenderer::new(font, style);
            let mut summary = RenderSummary {
                frames: frames.len(),
                warnings,
                ..Default::default()
            };

            for mut frame in frames {
                if cancel.is_cancelled() {
                    return Err(JobError::Cancelled);
                }
                let caption = caption_at(frame.timestamp, &segments);
                match renderer.caption_frame(&mut frame, &caption) {
                    Ok(true) => summary.captioned += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(video = %video, frame = frame.ordinal, error = %e, "could not caption frame, keeping it uncaptioned");
                        summary.failures += 1;
                    }
                }
            }
            Ok(summary)
        })
        .await
        .map_err(|e| JobError::Panicked(e.to_string()))?
    }
}

/// Copy the uploaded bytes into the job's scratch space.
async fn stage_input(content: &VideoContent, dest: &Path) -> std::io::Result<()> {
    match content {
        VideoContent::Bytes(bytes) => tokio::fs::write(dest, bytes).await,
        VideoContent::File(src) => tokio::fs::copy(src, dest).await.map(|_| ()),
    }
}

/// Race a stage against batch cancellation. Losing the race drops the stage
/// future, which kills any subprocess it spawned.
async fn guard<F, T, E>(cancel: &CancellationToken, stage: F) -> Result<T, JobError>
where
    F: Future<Output = Result<T, E>>,
    JobError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        result = stage => result.map_err(JobError::from),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::TranscriptionError;
    use crate::ports::extractor::MockFrameExtractor;
    use crate::ports::transcriber::{MockTranscriber, Transcriber};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Writes `seconds` gray PNG frames and a dummy wav, or fails when the
    /// video content is empty.
    pub(crate) struct FakeExtractor {
        pub seconds: u32,
        pub fail_audio: bool,
        pub delay: Duration,
    }

    impl FakeExtractor {
        pub(crate) fn new(seconds: u32) -> Self {
            Self {
                seconds,
                fail_audio: false,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl FrameExtractor for FakeExtractor {
        async fn extract_frames(&self, video: &Path, out_dir: &Path) -> Result<(), ExtractionError> {
            tokio::time::sleep(self.delay).await;
            if std::fs::metadata(video)?.len() == 0 {
                return Err(ExtractionError::EmptyInput);
            }
            std::fs::create_dir_all(out_dir)?;
            for ordinal in 1..=self.seconds {
                RgbImage::from_pixel(160, 120, Rgb([90, 90, 90]))
                    .save(out_dir.join(crate::domain::frames::frame_file_name(ordinal)))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            }
            Ok(())
        }

        async fn extract_audio(&self, _video: &Path, wav: &Path) -> Result<(), ExtractionError> {
            if self.fail_audio {
                return Err(ExtractionError::NoFrames);
            }
            std::fs::write(wav, b"RIFF")?;
            Ok(())
        }
    }

    pub(crate) fn pipeline(extractor: impl FrameExtractor + 'static, transcriber: impl Transcriber + 'static) -> Pipeline {
        Pipeline {
            extractor: Arc::new(extractor),
            transcriber: SharedTranscriber::new(Arc::new(transcriber), 1),
            fonts: FontChain::new(vec![PathBuf::from("/no/such/font.ttf")]),
            style: OverlayStyle::default(),
        }
    }

    pub(crate) fn hello_world() -> MockTranscriber {
        let mut mock = MockTranscriber::new();
        mock.expect_transcribe().returning(|_| {
            Ok(vec![
                TranscriptSegment::new(0.0, 1.5, "hello"),
                TranscriptSegment::new(1.2, 3.0, "world"),
            ])
        });
        mock
    }

    fn dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempdir().unwrap();
        let work = root.path().join("work");
        let outputs = root.path().join("outputs");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::create_dir_all(&outputs).unwrap();
        (root, work, outputs)
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_successful_job_captions_and_contributes_folder() {
        let (_root, work, outputs) = dirs();
        // four frames: t=3 has no covering segment
        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(FakeExtractor::new(4), hello_world()),
        );

        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert!(result.is_success(), "{}", result.message);
        assert_eq!(result.frames, 4);
        assert_eq!(result.captioned_frames, 3);
        assert_eq!(result.render_failures, 0);
        assert!(!result.warnings.is_empty(), "font fallback is reported");
        let out = outputs.join("clip");
        assert_eq!(result.output_dir.as_deref(), Some(out.as_path()));
        for name in ["frame_001.png", "frame_002.png", "frame_003.png", "frame_004.png"] {
            assert!(out.join(name).exists(), "{name}");
        }
        assert!(!out.join("audio.wav").exists());
        assert!(dir_is_empty(&work), "work dir must be torn down");
    }

    #[tokio::test]
    async fn test_uncaptioned_frame_is_untouched() {
        let (_root, work, outputs) = dirs();
        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(FakeExtractor::new(4), hello_world()),
        );
        job.run(&work, &outputs, &CancellationToken::new()).await;

        let gray = Rgb([90u8, 90, 90]);
        let untouched = image::open(outputs.join("clip/frame_004.png")).unwrap().to_rgb8();
        assert!(untouched.pixels().all(|p| *p == gray));
        let captioned = image::open(outputs.join("clip/frame_001.png")).unwrap().to_rgb8();
        assert!(captioned.pixels().any(|p| *p != gray));
    }

    #[tokio::test]
    async fn test_extraction_failure_fails_job_and_cleans_up() {
        let (_root, work, outputs) = dirs();
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().never();

        let job = VideoJob::new(
            InputVideo::from_bytes("broken.mp4", Vec::<u8>::new()),
            "broken",
            pipeline(FakeExtractor::new(3), transcriber),
        );
        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.message.contains("extraction failed"));
        assert!(result.output_dir.is_none());
        assert!(dir_is_empty(&work));
        assert!(dir_is_empty(&outputs));
    }

    #[tokio::test]
    async fn test_tool_spawn_failure_skips_later_stages() {
        let (_root, work, outputs) = dirs();
        let mut extractor = MockFrameExtractor::new();
        extractor.expect_extract_frames().times(1).returning(|_, _| {
            Err(ExtractionError::Spawn {
                tool: "ffmpeg".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            })
        });
        extractor.expect_extract_audio().never();
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().never();

        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(extractor, transcriber),
        );
        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(
            result.message,
            "clip.mp4: extraction failed: failed to spawn ffmpeg: not installed"
        );
        assert!(dir_is_empty(&work));
    }

    #[tokio::test]
    async fn test_zero_frames_is_extraction_failure() {
        let (_root, work, outputs) = dirs();
        let job = VideoJob::new(
            InputVideo::from_bytes("short.mp4", b"video".to_vec()),
            "short",
            pipeline(FakeExtractor::new(0), hello_world()),
        );
        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.message.contains("no frames"));
        assert!(dir_is_empty(&work));
    }

    #[tokio::test]
    async fn test_audio_failure_discards_extracted_frames() {
        let (_root, work, outputs) = dirs();
        let mut extractor = FakeExtractor::new(3);
        extractor.fail_audio = true;
        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(extractor, hello_world()),
        );
        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(dir_is_empty(&work));
        assert!(dir_is_empty(&outputs));
    }

    #[tokio::test]
    async fn test_transcription_failure_fails_job() {
        let (_root, work, outputs) = dirs();
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(TranscriptionError::Backend("model exploded".into())));

        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(FakeExtractor::new(2), transcriber),
        );
        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.message.contains("model exploded"));
        assert!(dir_is_empty(&work));
        assert!(dir_is_empty(&outputs));
    }

    #[tokio::test]
    async fn test_cancelled_job_fails_and_cleans_up() {
        let (_root, work, outputs) = dirs();
        let mut extractor = FakeExtractor::new(2);
        extractor.delay = Duration::from_secs(30);
        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(extractor, hello_world()),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let result = job.run(&work, &outputs, &cancel).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.message.contains("cancelled"));
        assert!(dir_is_empty(&work));
    }

    #[tokio::test]
    async fn test_job_reads_video_from_file() {
        let (root, work, outputs) = dirs();
        let upload = root.path().join("upload.mov");
        std::fs::write(&upload, b"video").unwrap();

        let job = VideoJob::new(
            InputVideo::from_file("upload.mov", &upload),
            "upload",
            pipeline(FakeExtractor::new(1), hello_world()),
        );
        let result = job.run(&work, &outputs, &CancellationToken::new()).await;

        assert!(result.is_success(), "{}", result.message);
        assert!(upload.exists(), "original upload is left alone");
    }

    #[tokio::test]
    async fn test_path_like_names_stay_inside_work_dir() {
        let (root, work, outputs) = dirs();
        let escaped = root.path().join("escaped.mp4");

        for (name, folder) in [
            (escaped.to_string_lossy().into_owned(), "escaped"),
            ("clips/a.mp4".to_string(), "a"),
        ] {
            let job = VideoJob::new(
                InputVideo::from_bytes(name.clone(), b"video".to_vec()),
                folder,
                pipeline(FakeExtractor::new(1), hello_world()),
            );
            let result = job.run(&work, &outputs, &CancellationToken::new()).await;
            assert!(result.is_success(), "{name}: {}", result.message);
        }

        assert!(!escaped.exists(), "video written outside the work dir");
        assert!(dir_is_empty(&work));
        assert!(outputs.join("escaped/frame_001.png").exists());
        assert!(outputs.join("a/frame_001.png").exists());
    }

    #[tokio::test]
    async fn test_job_starts_received() {
        let job = VideoJob::new(
            InputVideo::from_bytes("clip.mp4", b"video".to_vec()),
            "clip",
            pipeline(FakeExtractor::new(1), hello_world()),
        );
        assert_eq!(job.state(), JobState::Received);
    }
}
