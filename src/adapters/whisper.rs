//! In-process whisper.cpp transcription.
//!
//! The model is loaded once into a `WhisperContext`; every call creates its
//! own `WhisperState`, so concurrent jobs can share one loaded model.

use crate::domain::media::TranscriptSegment;
use crate::error::TranscriptionError;
use crate::ports::transcriber::Transcriber;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const SAMPLE_RATE: u32 = 16_000;

pub struct WhisperTranscriber {
    context: Arc<WhisperContext>,
    threads: i32,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Load a ggml model from disk.
    pub fn load(model_path: impl AsRef<Path>, threads: usize) -> Result<Self, TranscriptionError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(TranscriptionError::ModelLoad(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        info!("Loading Whisper model from {}", model_path.display());
        let path = model_path
            .to_str()
            .ok_or_else(|| TranscriptionError::ModelLoad("invalid path encoding".to_string()))?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| TranscriptionError::ModelLoad(e.to_string()))?;

        Ok(Self {
            context: Arc::new(context),
            threads: threads.max(1) as i32,
            language: None,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        let context = self.context.clone();
        let audio = audio.to_path_buf();
        let threads = self.threads;
        let language = self.language.clone();

        tokio::task::spawn_blocking(move || {
            let samples = load_samples(&audio)?;
            debug!(
                "Loaded {} samples ({:.2}s) from {}",
                samples.len(),
                samples.len() as f64 / f64::from(SAMPLE_RATE),
                audio.display()
            );
            run_inference(&context, &samples, threads, language.as_deref())
        })
        .await
        .map_err(|e| TranscriptionError::Backend(e.to_string()))?
    }
}

fn run_inference(
    context: &WhisperContext,
    samples: &[f32],
    threads: i32,
    language: Option<&str>,
) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_n_threads(threads);
    params.set_language(Some(language.unwrap_or("auto")));
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_special(false);
    params.set_print_timestamps(false);

    let mut state = context
        .create_state()
        .map_err(|e| TranscriptionError::Backend(e.to_string()))?;
    state
        .full(params, samples)
        .map_err(|e| TranscriptionError::Backend(e.to_string()))?;

    let count = state
        .full_n_segments()
        .map_err(|e| TranscriptionError::Backend(e.to_string()))?;
    let mut segments = Vec::with_capacity(count.max(0) as usize);

    for i in 0..count {
        let text = state
            .full_get_segment_text_lossy(i)
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?;
        // timestamps are in centiseconds
        let t0 = state
            .full_get_segment_t0(i)
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?;
        let t1 = state
            .full_get_segment_t1(i)
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?;

        let text = text.trim();
        if !text.is_empty() {
            segments.push(TranscriptSegment::new(t0 as f64 / 100.0, t1 as f64 / 100.0, text));
        }
    }

    info!("Transcription complete: {} segments", segments.len());
    Ok(segments)
}

/// Read a 16 kHz mono WAV into f32 samples in [-1, 1].
fn load_samples(path: &Path) -> Result<Vec<f32>, TranscriptionError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| TranscriptionError::Audio(format!("failed to open WAV file: {e}")))?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        return Err(TranscriptionError::Audio(format!(
            "expected {SAMPLE_RATE}Hz sample rate, got {}Hz",
            spec.sample_rate
        )));
    }
    if spec.channels != 1 {
        return Err(TranscriptionError::Audio(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }

    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| TranscriptionError::Audio(format!("failed to read sample: {e}")))
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| TranscriptionError::Audio(format!("failed to read sample: {e}"))),
    }
}
