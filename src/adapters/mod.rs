//! Adapters - Concrete implementations of ports.

pub mod archive;
pub mod events;
pub mod ffmpeg;
pub mod http;
pub mod whisper_cli;

#[cfg(feature = "whisper")]
pub mod whisper;
