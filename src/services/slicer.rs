use crate::types::{ChapterCandidate, RangeSegment, SpinePosition, SpineRange, TocEntry};
use tracing::debug;

pub struct SpineSlicer;

impl SpineSlicer {
    /// Give every kept entry the range up to the next kept entry; the last
    /// one runs to the end of the spine. `kept` must be in spine order.
    pub fn slice(kept: &[TocEntry]) -> Vec<ChapterCandidate> {
        kept.iter()
            .enumerate()
            .map(|(i, entry)| {
                let next_entry = kept.get(i + 1).cloned();
                let range = SpineRange {
                    start: position_of(entry),
                    end: next_entry.as_ref().map(position_of),
                };
                debug!(
                    "'{}' owns spine {}..{}",
                    entry.title,
                    range.start.spine_index,
                    range
                        .end
                        .as_ref()
                        .map_or_else(|| "end".to_string(), |e| e.spine_index.to_string())
                );
                ChapterCandidate {
                    entry: entry.clone(),
                    next_entry,
                    range,
                    text: String::new(),
                }
            })
            .collect()
    }

    /// Per-file pieces of `range`, in spine order.
    pub fn segments(range: &SpineRange, spine_len: usize) -> Vec<RangeSegment> {
        let start = &range.start;
        if start.spine_index >= spine_len {
            return Vec::new();
        }

        let (last, end_anchor) = match &range.end {
            None => (spine_len - 1, None),
            Some(end) if end.spine_index < start.spine_index => return Vec::new(),
            Some(end) if end.spine_index == start.spine_index => match &end.anchor {
                Some(anchor) => (end.spine_index, Some(anchor.clone())),
                // the next chapter starts at the top of this very file
                None => return Vec::new(),
            },
            Some(end) => match &end.anchor {
                Some(anchor) => (end.spine_index.min(spine_len - 1), Some(anchor.clone())),
                None => (end.spine_index - 1, None),
            },
        };

        (start.spine_index..=last)
            .map(|spine_index| RangeSegment {
                spine_index,
                start_anchor: if spine_index == start.spine_index {
                    start.anchor.clone()
                } else {
                    None
                },
                end_anchor: if spine_index == last {
                    end_anchor.clone()
                } else {
                    None
                },
            })
            .collect()
    }
}

fn position_of(entry: &TocEntry) -> SpinePosition {
    SpinePosition {
        spine_index: entry.spine_index,
        anchor: entry.anchor.clone(),
    }
}

/// Exclusive spine end of a range, as reported on extracted chapters.
pub fn spine_end(range: &SpineRange, spine_len: usize) -> usize {
    match &range.end {
        None => spine_len,
        Some(end) if end.anchor.is_some() => (end.spine_index + 1).min(spine_len),
        Some(end) => end.spine_index.max(range.start.spine_index + 1),
    }
}
