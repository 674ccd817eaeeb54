//! Turns the extractor's numbered output files into `Frame` values.
//!
//! The ordinal embedded in `frame_NNN.png` is parsed exactly once, here; from
//! then on every stage works with `Frame::timestamp`.

use super::media::Frame;
use regex::Regex;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

/// Output pattern handed to the extractor.
pub const FRAME_PATTERN: &str = "frame_%03d.png";

fn frame_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^frame_(\d{3,})\.png$").expect("valid frame regex"))
}

/// File name for the frame with the given ordinal.
pub fn frame_file_name(ordinal: u32) -> String {
    format!("frame_{ordinal:03}.png")
}

fn parse_ordinal(file_name: &str) -> Option<u32> {
    frame_name_regex()
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|&ordinal| ordinal > 0)
}

/// List the frames in `dir`, sorted by ordinal. Unrelated files are ignored.
pub async fn scan_frames(dir: &Path) -> io::Result<Vec<Frame>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(ordinal) = name.to_str().and_then(parse_ordinal) else {
            continue;
        };
        frames.push(Frame::new(ordinal, entry.path()));
    }

    frames.sort_by_key(|frame| frame.ordinal);
    Ok(frames)
}
