//! Framecap - Captioned screenshot batches from videos
//!
//! Every uploaded video becomes a folder of one-per-second screenshots with
//! a burned-in timecode and the speech transcribed for that second.
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (alignment, overlay, fonts, jobs)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (ffmpeg, whisper, zip, http)
//! - application/: Job and batch services
//! - config: Environment configuration
//!
//! # Features
//! - `whisper`: In-process transcription via whisper-rs

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use adapters::events::{BatchEvent, BatchProgress, EventHub};
pub use application::job::Pipeline;
pub use application::orchestrator::BatchOrchestrator;
pub use config::{PipelineConfig, ServerConfig};
pub use domain::jobs::{BatchResult, JobResult, JobStatus};
pub use domain::media::InputVideo;
