//! Maps a frame's whole-second timestamp to the transcript text covering it.

use super::media::TranscriptSegment;
use std::cmp::Ordering;

/// Caption for the frame at `t` seconds.
///
/// A segment contributes iff `start <= t < end`. Overlapping contributors are
/// ordered by start, then end, then their position in `segments`; each text is
/// trimmed and they are joined by a single space. No contributor means an
/// empty caption.
pub fn caption_at(t: u32, segments: &[TranscriptSegment]) -> String {
    let t = f64::from(t);
    let mut covering: Vec<(usize, &TranscriptSegment)> = segments
        .iter()
        .enumerate()
        .filter(|(_, seg)| seg.covers(t))
        .collect();

    // stable sort keeps arrival order as the last tie-break
    covering.sort_by(|(_, a), (_, b)| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(Ordering::Equal)
            .then(a.end.partial_cmp(&b.end).unwrap_or(Ordering::Equal))
    });

    covering
        .iter()
        .map(|(_, seg)| seg.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
