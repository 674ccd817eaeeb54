//! Frame/audio extraction through the `ffmpeg` command line.

use crate::domain::frames::FRAME_PATTERN;
use crate::error::ExtractionError;
use crate::ports::extractor::FrameExtractor;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One frame per second, stamped bottom-right with an `HH:MM:SS` timecode on
/// a half-transparent black box. Hours stay zero-padded (`00:01:05`);
/// strftime has no portable unpadded hour.
const TIMECODE_FILTER: &str = r"fps=1,drawtext=text='%{pts\:gmtime\:0\:%H\\:%M\\:%S}':x=w-tw-10:y=h-th-10:fontcolor=white:fontsize=24:box=1:boxcolor=black@0.5";

/// Keep error messages readable when ffmpeg dumps a lot of stderr.
const STDERR_TAIL: usize = 600;

#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    ffmpeg: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn run(&self, stage: &'static str, args: Vec<OsString>) -> Result<(), ExtractionError> {
        debug!(stage, ?args, "running ffmpeg");

        // kill_on_drop lets a cancelled job take the subprocess down with it
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractionError::Spawn {
                tool: self.ffmpeg.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::ToolFailed {
                stage,
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract_frames(&self, video: &Path, out_dir: &Path) -> Result<(), ExtractionError> {
        ensure_non_empty(video).await?;
        tokio::fs::create_dir_all(out_dir).await?;
        self.run("frame", frame_args(video, out_dir)).await
    }

    async fn extract_audio(&self, video: &Path, wav: &Path) -> Result<(), ExtractionError> {
        ensure_non_empty(video).await?;
        self.run("audio", audio_args(video, wav)).await
    }
}

async fn ensure_non_empty(video: &Path) -> Result<(), ExtractionError> {
    if tokio::fs::metadata(video).await?.len() == 0 {
        return Err(ExtractionError::EmptyInput);
    }
    Ok(())
}

fn frame_args(video: &Path, out_dir: &Path) -> Vec<OsString> {
    vec![
        "-nostdin".into(),
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.into(),
        "-vf".into(),
        TIMECODE_FILTER.into(),
        "-vsync".into(),
        "0".into(),
        out_dir.join(FRAME_PATTERN).into(),
    ]
}

/// 16 kHz mono s16le, which is what whisper expects.
fn audio_args(video: &Path, wav: &Path) -> Vec<OsString> {
    vec![
        "-nostdin".into(),
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.into(),
        "-vn".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        "16000".into(),
        wav.into(),
    ]
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_frame_args_shape() {
        let args = frame_args(Path::new("/in/clip.mp4"), Path::new("/out"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].starts_with("fps=1,drawtext="));
        assert!(args[vf + 1].contains("x=w-tw-10:y=h-th-10"));
        assert!(args[vf + 1].contains("boxcolor=black@0.5"));
        assert!(args[vf + 1].contains(r"%{pts\:gmtime\:0\:%H\\:%M\\:%S}"));
        assert_eq!(args.last().unwrap(), "/out/frame_%03d.png");
        assert!(args.contains(&"/in/clip.mp4".to_string()));
    }

    #[test]
    fn test_audio_args_mono_pcm() {
        let args: Vec<String> = audio_args(Path::new("a.mov"), Path::new("a.wav"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let joined = args.join(" ");
        assert!(joined.contains("-vn -acodec pcm_s16le -ac 1 -ar 16000"));
        assert_eq!(args.last().unwrap(), "a.wav");
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(STDERR_TAIL * 2);
        assert_eq!(stderr_tail(long.as_bytes()).len(), STDERR_TAIL);
        assert_eq!(stderr_tail(b"  short \n"), "short");
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("empty.mp4");
        std::fs::write(&video, b"").unwrap();

        let err = FfmpegExtractor::default()
            .extract_frames(&video, &dir.path().join("frames"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let err = FfmpegExtractor::new("/nonexistent/ffmpeg-binary")
            .extract_audio(&video, &dir.path().join("a.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_tool_failure() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let err = FfmpegExtractor::new("false")
            .extract_frames(&video, &dir.path().join("frames"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ToolFailed { stage: "frame", .. }));
    }
}
