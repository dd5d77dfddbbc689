use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// Chapters shorter than this many characters are discarded by default.
pub const DEFAULT_MIN_CHARS: usize = 2000;

/// Titles treated as front or back matter unless configured otherwise.
pub const DEFAULT_FRONT_BACK_KEYWORDS: &[&str] = &[
    "epigraph",
    "introduction",
    "preface",
    "foreword",
    "acknowledgments",
    "acknowledgements",
    "acknowledgment",
    "prologue",
    "epilogue",
    "about the author",
    "about the authors",
    "index",
    "contents",
    "table of contents",
    "cover",
    "title page",
    "copyright",
    "dedication",
    "author's note",
    "author\u{2019}s note",
    "further reading",
    "notes",
    "endnotes",
    "footnotes",
    "appendix",
    "bibliography",
    "recipe",
    "recipes",
    "discover more",
    "also by",
];

/// A manifest item of the package document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageResource {
    pub id: String,
    /// Normalised archive path, already resolved against the package directory.
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl PackageResource {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineEntry {
    pub idref: String,
    pub href: String,
    pub linear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TocFormat {
    Navigation,
    Ncx,
}

impl fmt::Display for TocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TocFormat::Navigation => write!(f, "navigation document"),
            TocFormat::Ncx => write!(f, "NCX"),
        }
    }
}

/// The table-of-contents resource chosen while reading the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocSource {
    Navigation {
        href: String,
        ncx_fallback: Option<String>,
    },
    Ncx {
        href: String,
    },
}

impl TocSource {
    pub fn format(&self) -> TocFormat {
        match self {
            TocSource::Navigation { .. } => TocFormat::Navigation,
            TocSource::Ncx { .. } => TocFormat::Ncx,
        }
    }

    pub fn href(&self) -> &str {
        match self {
            TocSource::Navigation { href, .. } | TocSource::Ncx { href } => href,
        }
    }
}

/// Parsed package document.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: String,
    pub resources: Vec<PackageResource>,
    pub spine: Vec<SpineEntry>,
    pub toc: TocSource,
}

/// A TOC entry as written in the TOC document, before spine resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTocEntry {
    pub title: String,
    pub target_file: String,
    pub anchor: Option<String>,
    pub depth: usize,
    pub play_order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub target_file: String,
    pub anchor: Option<String>,
    pub depth: usize,
    pub spine_index: usize,
    pub play_order: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    NumberedChapter,
    FrontBackMatter,
    Part,
    Unclassified,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::NumberedChapter => "numbered_chapter",
            Classification::FrontBackMatter => "front_back_matter",
            Classification::Part => "part",
            Classification::Unclassified => "unclassified",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Strict when at least three numbered chapters exist, loose otherwise
    #[default]
    Auto,
    /// Only numbered chapters
    Strict,
    /// Everything except front and back matter
    Loose,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::Auto => write!(f, "auto"),
            DetectionMode::Strict => write!(f, "strict"),
            DetectionMode::Loose => write!(f, "loose"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEntry {
    pub entry: TocEntry,
    pub classification: Classification,
}

/// A position in reading order: a spine file, optionally narrowed to an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinePosition {
    pub spine_index: usize,
    pub anchor: Option<String>,
}

/// Half-open content range; `end == None` runs to the end of the spine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineRange {
    pub start: SpinePosition,
    pub end: Option<SpinePosition>,
}

/// One spine file's share of a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSegment {
    pub spine_index: usize,
    pub start_anchor: Option<String>,
    pub end_anchor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChapterCandidate {
    pub entry: TocEntry,
    pub next_entry: Option<TocEntry>,
    pub range: SpineRange,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedChapter {
    pub sequence_number: usize,
    pub safe_filename: String,
    pub title: String,
    pub text: String,
    pub spine_start: usize,
    /// Exclusive.
    pub spine_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    UnresolvedTocEntry { title: String, href: String },
    UnknownSpineItem { idref: String },
    UntypedNavigation,
    NavigationFallback { reason: String },
    UnreadableSpineFile { path: String, reason: String },
    MissingAnchor { path: String, anchor: String },
}

impl ExtractionWarning {
    /// Logs the warning and appends it to `sink`.
    pub fn record(self, sink: &mut Vec<ExtractionWarning>) {
        warn!("{}", self);
        sink.push(self);
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedTocEntry { title, href } => {
                write!(f, "TOC entry '{}' ({}) is not in the spine, skipped", title, href)
            }
            Self::UnknownSpineItem { idref } => {
                write!(f, "spine references unknown manifest item '{}'", idref)
            }
            Self::UntypedNavigation => {
                write!(f, "no nav marked as toc, using the first nav element")
            }
            Self::NavigationFallback { reason } => {
                write!(f, "falling back to NCX: {}", reason)
            }
            Self::UnreadableSpineFile { path, reason } => {
                write!(f, "skipping unreadable file {}: {}", path, reason)
            }
            Self::MissingAnchor { path, anchor } => {
                write!(f, "anchor #{} not found in {}, using whole file", anchor, path)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub book_stem: String,
    pub toc_format: TocFormat,
    pub requested_mode: DetectionMode,
    pub effective_mode: DetectionMode,
    pub chapters: Vec<ExtractedChapter>,
    /// Chapters dropped for being shorter than the minimum length.
    pub discarded: usize,
    /// TOC entries that never resolved to a spine file.
    pub skipped: usize,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedEntry {
    pub title: String,
    pub target_file: String,
    pub anchor: Option<String>,
    pub depth: usize,
    pub spine_index: usize,
    pub classification: Classification,
    pub kept: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAnalysis {
    pub book_stem: String,
    pub package_path: String,
    pub toc_format: TocFormat,
    pub spine: Vec<SpineEntry>,
    pub entries: Vec<AnalyzedEntry>,
    pub numbered_chapters: usize,
    pub effective_mode: DetectionMode,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub min_chars: usize,
    pub front_back_keywords: Vec<String>,
    /// Drop `part` headings in loose mode as well.
    pub exclude_parts: bool,
    /// Keep `linear="no"` itemrefs in the spine.
    pub include_non_linear: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            front_back_keywords: DEFAULT_FRONT_BACK_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            exclude_parts: false,
            include_non_linear: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Directory receiving `<stem>_chapters/`; the book's own directory when unset.
    pub output_root: Option<PathBuf>,
    pub zip: bool,
    pub include_metadata: bool,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct WriteReport {
    pub chapter_dir: PathBuf,
    pub output_files: Vec<PathBuf>,
    pub zip_file: Option<PathBuf>,
    pub metadata_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_serialization() {
        let warning = ExtractionWarning::MissingAnchor {
            path: "OEBPS/ch1.xhtml".to_string(),
            anchor: "s2".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "missing_anchor");
        assert_eq!(json["anchor"], "s2");
        assert_eq!(
            warning.to_string(),
            "anchor #s2 not found in OEBPS/ch1.xhtml, using whole file"
        );
    }

    #[test]
    fn test_record_appends() {
        let mut sink = Vec::new();
        ExtractionWarning::UntypedNavigation.record(&mut sink);
        assert_eq!(sink, vec![ExtractionWarning::UntypedNavigation]);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(DetectionMode::default(), DetectionMode::Auto);
        assert_eq!(DetectionMode::Loose.to_string(), "loose");
        assert_eq!(Classification::FrontBackMatter.to_string(), "front_back_matter");
        assert_eq!(
            serde_json::to_value(Classification::NumberedChapter).unwrap(),
            "numbered_chapter"
        );
    }
}
