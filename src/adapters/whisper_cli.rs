//! Transcription through whisper.cpp's `whisper-cli`, reading its JSON output.

use crate::domain::media::TranscriptSegment;
use crate::error::TranscriptionError;
use crate::ports::transcriber::Transcriber;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    transcription: Vec<CliSegment>,
}

#[derive(Debug, Deserialize)]
struct CliSegment {
    offsets: CliOffsets,
    text: String,
}

/// Milliseconds from the start of the audio.
#[derive(Debug, Deserialize)]
struct CliOffsets {
    from: u64,
    to: u64,
}

#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    binary: PathBuf,
    model: PathBuf,
    language: Option<String>,
}

impl WhisperCliTranscriber {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        if !self.model.exists() {
            return Err(TranscriptionError::ModelLoad(format!(
                "model file not found: {}",
                self.model.display()
            )));
        }

        // whisper-cli appends ".json" to the -of prefix
        let prefix = audio.with_extension("transcript");
        let json_path = prefix.with_extension("transcript.json");

        let output = Command::new(&self.binary)
            .arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(audio)
            .arg("-l")
            .arg(self.language.as_deref().unwrap_or("auto"))
            .arg("-oj")
            .arg("-of")
            .arg(&prefix)
            .arg("-np")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                TranscriptionError::Backend(format!("failed to spawn {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(TranscriptionError::Backend(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let raw = tokio::fs::read(&json_path).await?;
        let _ = tokio::fs::remove_file(&json_path).await;
        let segments = parse_cli_json(&raw)?;

        info!(audio = %audio.display(), segments = segments.len(), "transcription complete");
        Ok(segments)
    }
}

fn parse_cli_json(raw: &[u8]) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
    let parsed: CliOutput = serde_json::from_slice(raw)?;
    let segments: Vec<TranscriptSegment> = parsed
        .transcription
        .into_iter()
        .map(|seg| {
            TranscriptSegment::new(
                seg.offsets.from as f64 / 1000.0,
                seg.offsets.to as f64 / 1000.0,
                seg.text.trim(),
            )
        })
        .filter(|seg| !seg.text.is_empty())
        .collect();
    debug!(count = segments.len(), "parsed whisper-cli segments");
    Ok(segments)
}
