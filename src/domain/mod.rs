//! Domain layer - Pure business logic.

pub mod align;
pub mod font;
pub mod frames;
pub mod jobs;
pub mod media;
pub mod overlay;
