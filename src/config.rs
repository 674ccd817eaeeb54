//! Configuration for the batch pipeline and the HTTP server.

use crate::adapters::ffmpeg::FfmpegExtractor;
use crate::adapters::whisper_cli::WhisperCliTranscriber;
use crate::application::job::Pipeline;
use crate::application::orchestrator::DEFAULT_MAX_CONCURRENT_JOBS;
use crate::application::transcriber::SharedTranscriber;
use crate::domain::font::FontChain;
use crate::domain::overlay::OverlayStyle;
use crate::error::TranscriptionError;
use crate::ports::transcriber::Transcriber;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which transcription backend the pipeline uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriberKind {
    /// whisper.cpp's `whisper-cli`, one subprocess per job
    Cli,
    /// whisper-rs, model loaded once in-process
    Whisper,
}

impl FromStr for TranscriberKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cli" => Ok(TranscriberKind::Cli),
            "whisper" => Ok(TranscriberKind::Whisper),
            other => Err(format!("unknown transcriber {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Upper bound on videos processed at the same time
    pub max_concurrent_jobs: usize,
    pub ffmpeg_bin: PathBuf,
    pub whisper_bin: PathBuf,
    pub whisper_model: PathBuf,
    pub transcriber: TranscriberKind,
    /// Spoken language hint; whisper auto-detects when unset
    pub language: Option<String>,
    /// Transcriptions allowed to run at once against the shared model
    pub transcribe_concurrency: usize,
    pub transcribe_timeout: Option<Duration>,
    pub caption_font_size: f32,
    pub bundled_font: PathBuf,
    pub system_font: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            whisper_bin: PathBuf::from("whisper-cli"),
            whisper_model: PathBuf::from("models/ggml-base.bin"),
            transcriber: TranscriberKind::Cli,
            language: None,
            transcribe_concurrency: 1,
            transcribe_timeout: None,
            caption_font_size: 20.0,
            bundled_font: PathBuf::from("fonts/NotoSansSC-Regular.ttf"),
            system_font: PathBuf::from("/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc"),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        Self {
            max_concurrent_jobs: parse_or(&lookup, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            ffmpeg_bin: path("FFMPEG_BIN", defaults.ffmpeg_bin),
            whisper_bin: path("WHISPER_BIN", defaults.whisper_bin),
            whisper_model: path("WHISPER_MODEL", defaults.whisper_model),
            transcriber: parse_or(&lookup, "TRANSCRIBER", defaults.transcriber),
            language: lookup("WHISPER_LANGUAGE").filter(|lang| !lang.trim().is_empty()),
            transcribe_concurrency: parse_or(&lookup, "TRANSCRIBE_CONCURRENCY", defaults.transcribe_concurrency),
            transcribe_timeout: Some(parse_or(&lookup, "TRANSCRIBE_TIMEOUT_SECS", 0u64))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            caption_font_size: parse_or(&lookup, "CAPTION_FONT_SIZE", defaults.caption_font_size),
            bundled_font: path("BUNDLED_FONT", defaults.bundled_font),
            system_font: path("SYSTEM_FONT", defaults.system_font),
        }
    }

    /// Build the shared pipeline. The transcription model is loaded here,
    /// once, and reused by every job run through the returned pipeline.
    pub fn build_pipeline(&self) -> Result<Pipeline, TranscriptionError> {
        let backend = self.transcriber_backend()?;
        Ok(Pipeline {
            extractor: Arc::new(FfmpegExtractor::new(&self.ffmpeg_bin)),
            transcriber: SharedTranscriber::new(backend, self.transcribe_concurrency)
                .with_timeout(self.transcribe_timeout),
            fonts: FontChain::bundled_then_system(&self.bundled_font, &self.system_font),
            style: OverlayStyle {
                font_size: self.caption_font_size,
                ..OverlayStyle::default()
            },
        })
    }

    fn transcriber_backend(&self) -> Result<Arc<dyn Transcriber>, TranscriptionError> {
        match self.transcriber {
            TranscriberKind::Cli => {
                info!(binary = %self.whisper_bin.display(), model = %self.whisper_model.display(), "using whisper-cli transcriber");
                let mut backend = WhisperCliTranscriber::new(&self.whisper_bin, &self.whisper_model);
                if let Some(language) = &self.language {
                    backend = backend.with_language(language);
                }
                Ok(Arc::new(backend))
            }
            #[cfg(feature = "whisper")]
            TranscriberKind::Whisper => {
                let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
                let mut backend = crate::adapters::whisper::WhisperTranscriber::load(&self.whisper_model, threads)?;
                if let Some(language) = &self.language {
                    backend = backend.with_language(language);
                }
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "whisper"))]
            TranscriberKind::Whisper => Err(TranscriptionError::ModelLoad(
                "TRANSCRIBER=whisper requires building with the `whisper` feature".to_string(),
            )),
        }
    }
}

/// Configuration for the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory holding one scratch folder per batch
    pub data_dir: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| String::from("./data"))),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparsable setting, using default");
            default
        }),
        None => default,
    }
}
