//! Application layer - Services that drive the pipeline through ports.

pub mod job;
pub mod orchestrator;
pub mod transcriber;
