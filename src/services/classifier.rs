use crate::error::{EpubChapterError, Result};
use crate::services::xml::collapse_whitespace;
use crate::types::{Classification, ClassifiedEntry, DetectionMode, ExtractionConfig, TocEntry};
use regex::Regex;
use tracing::{debug, info};

/// `auto` behaves like `strict` from this many numbered chapters on.
pub const AUTO_STRICT_THRESHOLD: usize = 3;

const NUMBER_WORDS: &[&str] = &[
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety", "hundred",
];

const ORDINAL_WORDS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

/// Classified TOC together with the entries the detection mode keeps.
#[derive(Debug, Clone)]
pub struct Selection {
    pub entries: Vec<ClassifiedEntry>,
    /// Indices into `entries`, ascending.
    pub kept: Vec<usize>,
    pub numbered: usize,
    pub effective_mode: DetectionMode,
}

impl Selection {
    pub fn kept_entries(&self) -> impl Iterator<Item = &ClassifiedEntry> + '_ {
        self.kept.iter().map(move |&idx| &self.entries[idx])
    }

    pub fn is_kept(&self, idx: usize) -> bool {
        self.kept.binary_search(&idx).is_ok()
    }
}

pub struct ChapterClassifier {
    chapter_pattern: Regex,
    leading_number: Regex,
    leading_token: Regex,
    part_pattern: Regex,
    roman_pattern: Regex,
    keywords: Vec<String>,
    exclude_parts: bool,
}

impl ChapterClassifier {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let keywords = config
            .front_back_keywords
            .iter()
            .map(|k| collapse_whitespace(k).to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            // "Chapter 3", "capítulo tres", "chap. IV"
            chapter_pattern: compile(
                r"^(?:chapter|chap\.?|cap[ií]tulo|chapitre|kapitel|capitolo)\s*(?P<num>[^\s:.,;)]+)",
            )?,
            // "1 Title", "2.Title", "12"
            leading_number: compile(r"^\d+(?:[^\p{L}]|$)")?,
            leading_token: compile(r"^(?P<tok>[^\s:.,;)]+)")?,
            // "Part Two", "Book IV"
            part_pattern: compile(r"^(?:part|parte|partie|book)\s+(?P<num>[^\s:.,;)]+)")?,
            roman_pattern: compile(r"^m{0,4}(?:cm|cd|d?c{0,3})(?:xc|xl|l?x{0,3})(?:ix|iv|v?i{0,3})$")?,
            keywords,
            exclude_parts: config.exclude_parts,
        })
    }

    /// Rule precedence: numbered chapter, part, front/back matter, unclassified.
    pub fn classify(&self, title: &str) -> Classification {
        let display = collapse_whitespace(title);
        let normalized = display.to_lowercase();

        if self.is_numbered_chapter(&display, &normalized) {
            Classification::NumberedChapter
        } else if self.is_part(&normalized) {
            Classification::Part
        } else if self.is_front_back_matter(&normalized) {
            Classification::FrontBackMatter
        } else {
            Classification::Unclassified
        }
    }

    pub fn is_numbered_chapter(&self, display: &str, normalized: &str) -> bool {
        if let Some(caps) = self.chapter_pattern.captures(normalized) {
            if self.is_numeral(trim_dashes(&caps["num"])) {
                return true;
            }
        }

        if self.leading_number.is_match(normalized) {
            return true;
        }

        match self.leading_token.captures(display) {
            Some(caps) => {
                let token = trim_dashes(&caps["tok"]);
                let lower = token.to_lowercase();
                if is_number_word(&lower) {
                    return true;
                }
                // a leading roman numeral must be written in capitals and never a lone "I"
                lower != "i"
                    && token.chars().all(|c| c.is_ascii_uppercase())
                    && self.is_roman(&lower)
            }
            None => false,
        }
    }

    pub fn is_part(&self, normalized: &str) -> bool {
        self.part_pattern.captures(normalized).map_or(false, |caps| {
            let token = trim_dashes(&caps["num"]);
            ORDINAL_WORDS.contains(&token) || self.is_numeral(token)
        })
    }

    /// Keyword at the start of the title (optionally after "the"), followed
    /// by nothing, punctuation, whitespace or digits.
    pub fn is_front_back_matter(&self, normalized: &str) -> bool {
        let without_article = normalized.strip_prefix("the ");
        self.keywords.iter().any(|keyword| {
            starts_with_keyword(normalized, keyword)
                || without_article.map_or(false, |rest| starts_with_keyword(rest, keyword))
        })
    }

    /// Classify every entry and keep those `mode` selects, in spine order.
    pub fn select(&self, entries: Vec<TocEntry>, mode: DetectionMode) -> Selection {
        let entries: Vec<ClassifiedEntry> = entries
            .into_iter()
            .map(|entry| {
                let classification = self.classify(&entry.title);
                debug!("'{}' classified as {}", entry.title, classification);
                ClassifiedEntry {
                    entry,
                    classification,
                }
            })
            .collect();

        let numbered = entries
            .iter()
            .filter(|e| e.classification == Classification::NumberedChapter)
            .count();

        let effective_mode = match mode {
            DetectionMode::Auto if numbered >= AUTO_STRICT_THRESHOLD => DetectionMode::Strict,
            DetectionMode::Auto => DetectionMode::Loose,
            other => other,
        };

        let kept: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| self.keeps(effective_mode, e.classification))
            .map(|(idx, _)| idx)
            .collect();

        info!(
            "Detection mode {} (effective {}): {} numbered chapters, keeping {} of {} entries",
            mode,
            effective_mode,
            numbered,
            kept.len(),
            entries.len()
        );

        Selection {
            entries,
            kept,
            numbered,
            effective_mode,
        }
    }

    /// Like [`select`](Self::select), but an empty kept set is an error.
    pub fn select_chapters(&self, entries: Vec<TocEntry>, mode: DetectionMode) -> Result<Selection> {
        let total = entries.len();
        let selection = self.select(entries, mode);
        if selection.kept.is_empty() {
            return Err(EpubChapterError::NoChaptersFound {
                reason: format!(
                    "none of the {} TOC entries qualifies as a chapter in {} mode",
                    total, selection.effective_mode
                ),
            });
        }
        Ok(selection)
    }

    fn keeps(&self, effective_mode: DetectionMode, classification: Classification) -> bool {
        match effective_mode {
            DetectionMode::Strict => classification == Classification::NumberedChapter,
            DetectionMode::Loose | DetectionMode::Auto => match classification {
                Classification::FrontBackMatter => false,
                Classification::Part => !self.exclude_parts,
                _ => true,
            },
        }
    }

    /// Digits, an English number word or a roman numeral in any case.
    fn is_numeral(&self, token: &str) -> bool {
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
        let lower = token.to_lowercase();
        is_number_word(&lower) || self.is_roman(&lower)
    }

    fn is_roman(&self, lower: &str) -> bool {
        !lower.is_empty() && self.roman_pattern.is_match(lower)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| EpubChapterError::InvalidConfig {
        reason: format!("bad classifier pattern {}: {}", pattern, e),
    })
}

fn trim_dashes(token: &str) -> &str {
    token.trim_matches(|c: char| c == '-' || c == '\u{2013}' || c == '\u{2014}')
}

/// "seven", "twenty-one"
fn is_number_word(lower: &str) -> bool {
    !lower.is_empty() && lower.split('-').all(|part| NUMBER_WORDS.contains(&part))
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.strip_prefix(keyword)
        .map_or(false, |rest| rest.chars().next().map_or(true, |c| !c.is_alphabetic()))
}
