use crate::services::slicer;
use crate::types::{ChapterCandidate, ExtractedChapter};
use tracing::debug;

const MAX_NAME_CHARS: usize = 60;

pub struct ChapterNamer;

impl ChapterNamer {
    /// Drop short or empty chapters, then number and name the survivors.
    /// Returns the chapters and how many were discarded.
    pub fn finalize(
        candidates: Vec<ChapterCandidate>,
        min_chars: usize,
        spine_len: usize,
    ) -> (Vec<ExtractedChapter>, usize) {
        let total = candidates.len();
        let survivors: Vec<ChapterCandidate> = candidates
            .into_iter()
            .filter(|c| {
                let length = c.text.chars().count();
                // an empty range never yields a chapter, even with no minimum
                let keep = length >= min_chars && !c.text.trim().is_empty();
                if !keep {
                    debug!(
                        "Discarding '{}': {} chars, minimum {}",
                        c.entry.title, length, min_chars
                    );
                }
                keep
            })
            .collect();
        let discarded = total - survivors.len();
        let width = sequence_width(survivors.len());

        let chapters = survivors
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| {
                let sequence_number = i + 1;
                ExtractedChapter {
                    sequence_number,
                    safe_filename: Self::file_name(sequence_number, width, &candidate.entry.title),
                    spine_start: candidate.range.start.spine_index,
                    spine_end: slicer::spine_end(&candidate.range, spine_len),
                    title: candidate.entry.title,
                    text: candidate.text,
                }
            })
            .collect();

        (chapters, discarded)
    }

    /// `07_The_Storm.txt`
    pub fn file_name(sequence_number: usize, width: usize, title: &str) -> String {
        let safe = safe_title(title);
        let safe = if safe.is_empty() {
            format!("chapter_{}", sequence_number)
        } else {
            safe
        };
        format!("{:0width$}_{}.txt", sequence_number, safe, width = width)
    }
}

/// Runs of characters other than alphanumerics, `-` and `_` become a single
/// `_`; the result is trimmed of `_` and capped at 60 characters.
pub fn safe_title(title: &str) -> String {
    let mut safe = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            safe.push(c);
        } else if !safe.ends_with('_') {
            safe.push('_');
        }
    }

    let capped: String = safe.trim_matches('_').chars().take(MAX_NAME_CHARS).collect();
    capped.trim_end_matches('_').to_string()
}

/// Digits of the largest sequence number, at least two.
pub fn sequence_width(count: usize) -> usize {
    count.to_string().len().max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SpinePosition, SpineRange, TocEntry};

    fn candidate(title: &str, spine_index: usize, text: String) -> ChapterCandidate {
        ChapterCandidate {
            entry: TocEntry {
                title: title.to_string(),
                target_file: format!("OEBPS/{}.xhtml", spine_index),
                anchor: None,
                depth: 0,
                spine_index,
                play_order: None,
            },
            next_entry: None,
            range: SpineRange {
                start: SpinePosition {
                    spine_index,
                    anchor: None,
                },
                end: Some(SpinePosition {
                    spine_index: spine_index + 1,
                    anchor: None,
                }),
            },
            text,
        }
    }

    #[test]
    fn test_length_threshold() {
        let candidates = vec![
            candidate("Short", 0, "a".repeat(1500)),
            candidate("Exact", 1, "b".repeat(2000)),
            candidate("Long", 2, "c".repeat(2500)),
        ];
        let (chapters, discarded) = ChapterNamer::finalize(candidates, 2000, 3);

        assert_eq!(discarded, 1);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "Exact");
        assert_eq!(chapters[0].sequence_number, 1);
        assert_eq!(chapters[0].safe_filename, "01_Exact.txt");
        assert_eq!(chapters[1].safe_filename, "02_Long.txt");
        assert_eq!((chapters[1].spine_start, chapters[1].spine_end), (2, 3));
    }

    #[test]
    fn test_threshold_counts_characters() {
        let (chapters, _) = ChapterNamer::finalize(vec![candidate("É", 0, "é".repeat(10))], 10, 1);
        assert_eq!(chapters.len(), 1);
    }

    #[test]
    fn test_empty_text_dropped_without_minimum() {
        let candidates = vec![
            candidate("Part One", 0, String::new()),
            candidate("Blank", 0, " \n\n ".to_string()),
            candidate("Chapter 1", 0, "It began.".to_string()),
        ];
        let (chapters, discarded) = ChapterNamer::finalize(candidates, 0, 2);

        assert_eq!(discarded, 2);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].safe_filename, "01_Chapter_1.txt");
    }

    #[test]
    fn test_safe_title() {
        assert_eq!(safe_title("Chapter 1: How to Jump Really High"), "Chapter_1_How_to_Jump_Really_High");
        assert_eq!(safe_title("  ...Well?  "), "Well");
        assert_eq!(safe_title("Capítulo 3 — Año"), "Capítulo_3_Año");
        assert_eq!(safe_title("self-help_guide"), "self-help_guide");
        assert_eq!(safe_title("!!!"), "");
        assert_eq!(safe_title(&"x".repeat(80)).chars().count(), 60);
        assert_eq!(safe_title(&format!("{} y", "x".repeat(59))), "x".repeat(59));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ChapterNamer::file_name(3, 2, "???"), "03_chapter_3.txt");
        assert_eq!(ChapterNamer::file_name(7, 3, "The Storm"), "007_The_Storm.txt");
        assert_eq!(sequence_width(9), 2);
        assert_eq!(sequence_width(120), 3);
    }
}
