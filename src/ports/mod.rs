//! Ports - Traits at the external-tool seams.

pub mod extractor;
pub mod transcriber;

pub use extractor::FrameExtractor;
pub use transcriber::Transcriber;
