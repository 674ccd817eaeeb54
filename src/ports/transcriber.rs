use crate::domain::media::TranscriptSegment;
use crate::error::TranscriptionError;
use async_trait::async_trait;
use std::path::Path;

/// Speech-to-text over a mono PCM WAV file.
///
/// Implementations are shared by every job in a batch, so `transcribe` may be
/// called concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Time-bounded segments for the spoken content of `audio`. Silent regions
    /// produce no segment.
    async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError>;
}
