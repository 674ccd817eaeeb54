//! One transcription backend shared by every job of a batch.
//!
//! The backend (and its loaded model) is created once and handed to the
//! orchestrator; jobs only borrow inference slots from it. The number of
//! slots bounds how many transcriptions run at the same time.

use crate::domain::media::TranscriptSegment;
use crate::error::TranscriptionError;
use crate::ports::transcriber::Transcriber;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Clone)]
pub struct SharedTranscriber {
    backend: Arc<dyn Transcriber>,
    slots: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl SharedTranscriber {
    pub fn new(backend: Arc<dyn Transcriber>, max_concurrent: usize) -> Self {
        Self {
            backend,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| TranscriptionError::Backend("transcriber shut down".to_string()))?;
        debug!(audio = %audio.display(), "transcription slot acquired");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.transcribe(audio))
                .await
                .map_err(|_| TranscriptionError::TimedOut(limit))?,
            None => self.backend.transcribe(audio).await,
        }
    }
}
