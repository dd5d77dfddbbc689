use crate::error::{EpubChapterError, Result};
use crate::services::archive::EpubArchive;
use crate::services::classifier::ChapterClassifier;
use crate::services::extractor::TextExtractor;
use crate::services::namer::ChapterNamer;
use crate::services::package::PackageReader;
use crate::services::slicer::SpineSlicer;
use crate::services::toc::TocParser;
use crate::types::{
    AnalyzedEntry, BookAnalysis, DetectionMode, ExtractionConfig, ExtractionResult, TocEntry,
};
use std::io::{Read, Seek};
use std::path::Path;
use tracing::info;

/// Runs the whole chain for one book: package, TOC, classification,
/// slicing, text extraction and naming. Holds no per-book state.
pub struct ChapterExtractor {
    config: ExtractionConfig,
    classifier: ChapterClassifier,
}

impl ChapterExtractor {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        let classifier = ChapterClassifier::new(&config)?;
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn extract(&self, path: &Path, mode: DetectionMode) -> Result<ExtractionResult> {
        info!("Extracting chapters from {}", path.display());
        let mut archive = EpubArchive::open(path)?;
        self.extract_from(&mut archive, &book_stem(path), mode)
    }

    pub fn extract_from<R: Read + Seek>(
        &self,
        archive: &mut EpubArchive<R>,
        book_stem: &str,
        mode: DetectionMode,
    ) -> Result<ExtractionResult> {
        let mut warnings = Vec::new();
        let package = PackageReader::read(archive, self.config.include_non_linear, &mut warnings)?;
        let toc = TocParser::read(archive, &package, &mut warnings)?;
        let selection = self.classifier.select_chapters(toc.entries, mode)?;

        let kept: Vec<TocEntry> = selection.kept_entries().map(|c| c.entry.clone()).collect();
        let mut candidates = SpineSlicer::slice(&kept);

        let mut extractor = TextExtractor::new();
        for candidate in &mut candidates {
            candidate.text =
                extractor.extract(archive, &package.spine, &candidate.range, &mut warnings);
        }

        let (chapters, discarded) =
            ChapterNamer::finalize(candidates, self.config.min_chars, package.spine.len());

        info!(
            "{}: {} chapters extracted, {} below {} chars, {} TOC entries unresolved",
            book_stem,
            chapters.len(),
            discarded,
            self.config.min_chars,
            toc.unresolved
        );

        Ok(ExtractionResult {
            book_stem: book_stem.to_string(),
            toc_format: toc.format,
            requested_mode: mode,
            effective_mode: selection.effective_mode,
            chapters,
            discarded,
            skipped: toc.unresolved,
            warnings,
        })
    }

    pub fn analyze(&self, path: &Path, mode: DetectionMode) -> Result<BookAnalysis> {
        info!("Analyzing {}", path.display());
        let mut archive = EpubArchive::open(path)?;
        self.analyze_from(&mut archive, &book_stem(path), mode)
    }

    /// Classification report for every resolved TOC entry; never fails for
    /// lack of chapters.
    pub fn analyze_from<R: Read + Seek>(
        &self,
        archive: &mut EpubArchive<R>,
        book_stem: &str,
        mode: DetectionMode,
    ) -> Result<BookAnalysis> {
        let mut warnings = Vec::new();
        let package = PackageReader::read(archive, self.config.include_non_linear, &mut warnings)?;
        let toc = TocParser::read(archive, &package, &mut warnings)?;
        let selection = self.classifier.select(toc.entries, mode);

        let entries = selection
            .entries
            .iter()
            .enumerate()
            .map(|(idx, classified)| AnalyzedEntry {
                title: classified.entry.title.clone(),
                target_file: classified.entry.target_file.clone(),
                anchor: classified.entry.anchor.clone(),
                depth: classified.entry.depth,
                spine_index: classified.entry.spine_index,
                classification: classified.classification,
                kept: selection.is_kept(idx),
            })
            .collect();

        Ok(BookAnalysis {
            book_stem: book_stem.to_string(),
            package_path: package.path,
            toc_format: toc.format,
            spine: package.spine,
            entries,
            numbered_chapters: selection.numbered,
            effective_mode: selection.effective_mode,
            warnings,
        })
    }

    /// Check that the book opens and its TOC resolves to at least one spine file.
    pub fn validate(&self, path: &Path) -> Result<BookAnalysis> {
        let analysis = self.analyze(path, DetectionMode::Auto)?;
        if analysis.entries.is_empty() {
            return Err(EpubChapterError::MissingToc {
                path: analysis.package_path,
            });
        }
        Ok(analysis)
    }
}

/// File name of the book without its extension.
pub fn book_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "book".to_string())
}
