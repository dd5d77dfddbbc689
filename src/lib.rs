//! # EPUB Chapter Extraction Library
//!
//! Splits EPUB books into per-chapter plain text using the book's own table
//! of contents. Both EPUB3 navigation documents and legacy NCX files are
//! read; entries are classified as chapters, parts or front/back matter and
//! the spine is sliced between the entries that are kept.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use epub_chapters::{ChapterExtractor, ChapterWriter, DetectionMode, ExtractionConfig, OutputConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let book = Path::new("novel.epub");
//!     let extractor = ChapterExtractor::new(ExtractionConfig::default())?;
//!     let result = extractor.extract(book, DetectionMode::Auto)?;
//!
//!     let report = ChapterWriter::write(&result, book, &OutputConfig::default()).await?;
//!     println!("Wrote {} chapters to {}", report.output_files.len(), report.chapter_dir.display());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod services;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export main types and services for easier usage
pub use error::{EpubChapterError, Result};
pub use services::{ChapterClassifier, ChapterExtractor, ChapterWriter, SourceCollector};
pub use types::{
    BookAnalysis, Classification, DetectionMode, ExtractedChapter, ExtractionConfig,
    ExtractionResult, ExtractionWarning, OutputConfig, TocFormat, WriteReport,
    DEFAULT_FRONT_BACK_KEYWORDS, DEFAULT_MIN_CHARS,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
