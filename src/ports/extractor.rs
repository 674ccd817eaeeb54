use crate::error::ExtractionError;
use async_trait::async_trait;
use std::path::Path;

/// Frame and audio extraction by the external transcoder.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write one timecode-watermarked PNG per second of `video` into
    /// `out_dir`, named `frame_001.png`, `frame_002.png`, ...
    async fn extract_frames(&self, video: &Path, out_dir: &Path) -> Result<(), ExtractionError>;

    /// Write the full audio track of `video` to `wav` as 16-bit mono PCM.
    async fn extract_audio(&self, video: &Path, wav: &Path) -> Result<(), ExtractionError>;
}
