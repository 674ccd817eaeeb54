use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Container extensions accepted at upload time. Only the name is checked.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

pub fn is_supported_container(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Reduce an uploaded file name to a bare file name, rejecting traversal.
pub fn sanitize_upload_name(name: &str) -> Option<String> {
    let path = Path::new(name);
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return None;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(String::from)
}

/// Where the raw bytes of an uploaded video live.
#[derive(Debug, Clone)]
pub enum VideoContent {
    Bytes(Bytes),
    File(PathBuf),
}

/// An uploaded video. Immutable once received.
#[derive(Debug, Clone)]
pub struct InputVideo {
    /// Original file name, e.g. `clip.mp4`
    pub name: String,
    pub content: VideoContent,
}

impl InputVideo {
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: VideoContent::Bytes(content.into()),
        }
    }

    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            content: VideoContent::File(path.into()),
        }
    }

    /// File stem used for the output folder name.
    pub fn basename(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("video")
            .to_string()
    }

    /// Fixed name the video is copied to inside a job's WorkDir. Only the
    /// extension of the upload name survives, so the name can never point
    /// outside the WorkDir.
    pub fn staged_file_name(&self) -> String {
        match Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            Some(ext) => format!("input.{}", ext.to_ascii_lowercase()),
            None => "input".to_string(),
        }
    }
}

/// One extracted still, one per elapsed second of video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 1-based position in the extracted sequence
    pub ordinal: u32,
    /// Whole seconds since the start of the video (`ordinal - 1`)
    pub timestamp: u32,
    pub path: PathBuf,
    pub captioned: bool,
}

impl Frame {
    pub fn new(ordinal: u32, path: PathBuf) -> Self {
        Self {
            ordinal,
            timestamp: ordinal.saturating_sub(1),
            path,
            captioned: false,
        }
    }
}

/// A time-bounded piece of transcribed speech covering `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn covers(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}
