use crate::error::{EpubChapterError, Result};
use crate::types::{ExtractedChapter, ExtractionResult, OutputConfig, WriteReport};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const METADATA_FILE: &str = "metadata.json";

pub struct ChapterWriter;

impl ChapterWriter {
    /// Write `<stem>_chapters/` next to `source` (or under the configured
    /// output root), plus the optional zip bundle and metadata file.
    pub async fn write(
        result: &ExtractionResult,
        source: &Path,
        config: &OutputConfig,
    ) -> Result<WriteReport> {
        let parent = Self::output_parent(source, config);
        let dir_name = format!("{}_chapters", result.book_stem);
        let chapter_dir = parent.join(&dir_name);

        Self::prepare_directory(&chapter_dir, config.force).await?;

        let mut output_files = Vec::with_capacity(result.chapters.len());
        for chapter in &result.chapters {
            let path = chapter_dir.join(&chapter.safe_filename);
            fs::write(&path, Self::chapter_contents(chapter))
                .await
                .map_err(|e| EpubChapterError::OutputDirectory {
                    reason: format!("Failed to write chapter file {}: {}", path.display(), e),
                })?;
            debug!("Wrote {}", path.display());
            output_files.push(path);
        }

        let metadata_file = if config.include_metadata {
            let path = chapter_dir.join(METADATA_FILE);
            Self::write_metadata_file(&path, result, source).await?;
            Some(path)
        } else {
            None
        };

        let zip_file = if config.zip {
            let path = parent.join(format!("{}.zip", dir_name));
            let bytes = Self::bundle(&dir_name, &result.chapters)?;
            fs::write(&path, bytes)
                .await
                .map_err(|e| EpubChapterError::OutputDirectory {
                    reason: format!("Failed to write archive {}: {}", path.display(), e),
                })?;
            info!("Created archive: {}", path.display());
            Some(path)
        } else {
            None
        };

        info!(
            "Wrote {} chapter files to {}",
            output_files.len(),
            chapter_dir.display()
        );

        Ok(WriteReport {
            chapter_dir,
            output_files,
            zip_file,
            metadata_file,
        })
    }

    /// Title line, a blank line, then the body.
    pub fn chapter_contents(chapter: &ExtractedChapter) -> String {
        format!("{}\n\n{}", chapter.title, chapter.text)
    }

    fn output_parent(source: &Path, config: &OutputConfig) -> PathBuf {
        match &config.output_root {
            Some(root) => root.clone(),
            None => source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    async fn prepare_directory(chapter_dir: &Path, force: bool) -> Result<()> {
        if fs::metadata(chapter_dir).await.is_ok() {
            let mut entries = fs::read_dir(chapter_dir).await.map_err(|e| {
                EpubChapterError::OutputDirectory {
                    reason: format!("Cannot read output directory: {}", e),
                }
            })?;
            let occupied = entries.next_entry().await?.is_some();
            if occupied && !force {
                return Err(EpubChapterError::OutputDirectory {
                    reason: format!(
                        "{} is not empty. Use --force to overwrite.",
                        chapter_dir.display()
                    ),
                });
            }
            return Ok(());
        }

        fs::create_dir_all(chapter_dir)
            .await
            .map_err(|e| EpubChapterError::OutputDirectory {
                reason: format!("Failed to create output directory: {}", e),
            })?;
        info!("Created output directory: {}", chapter_dir.display());
        Ok(())
    }

    /// Deflated zip with every chapter under `<dir_name>/`.
    pub fn bundle(dir_name: &str, chapters: &[ExtractedChapter]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for chapter in chapters {
            zip.start_file(format!("{}/{}", dir_name, chapter.safe_filename), deflated)?;
            zip.write_all(Self::chapter_contents(chapter).as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }

    async fn write_metadata_file(
        metadata_path: &Path,
        result: &ExtractionResult,
        source: &Path,
    ) -> Result<()> {
        let metadata = serde_json::json!({
            "source": source.display().to_string(),
            "book_stem": result.book_stem,
            "extracted_at": chrono::Utc::now().to_rfc3339(),
            "toc_format": result.toc_format,
            "requested_mode": result.requested_mode,
            "effective_mode": result.effective_mode,
            "total_chapters": result.chapters.len(),
            "discarded": result.discarded,
            "skipped": result.skipped,
            "chapters": result.chapters.iter().map(|chapter| {
                serde_json::json!({
                    "sequence_number": chapter.sequence_number,
                    "title": chapter.title,
                    "filename": chapter.safe_filename,
                    "spine_start": chapter.spine_start,
                    "spine_end": chapter.spine_end,
                    "characters": chapter.text.chars().count(),
                })
            }).collect::<Vec<_>>(),
            "warnings": result.warnings,
        });

        let json_content = serde_json::to_string_pretty(&metadata).map_err(|e| {
            EpubChapterError::OutputDirectory {
                reason: format!("Failed to serialize metadata: {}", e),
            }
        })?;

        fs::write(metadata_path, json_content)
            .await
            .map_err(|e| EpubChapterError::OutputDirectory {
                reason: format!("Failed to write metadata file: {}", e),
            })?;

        info!("Generated metadata file: {}", metadata_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionMode, ExtractionWarning, TocFormat};
    use std::io::Read;
    use tempfile::TempDir;

    fn result() -> ExtractionResult {
        let chapter = |n: usize, title: &str, text: &str| ExtractedChapter {
            sequence_number: n,
            safe_filename: format!("{:02}_{}.txt", n, title.replace(' ', "_")),
            title: title.to_string(),
            text: text.to_string(),
            spine_start: n,
            spine_end: n + 1,
        };
        ExtractionResult {
            book_stem: "novel".to_string(),
            toc_format: TocFormat::Ncx,
            requested_mode: DetectionMode::Auto,
            effective_mode: DetectionMode::Strict,
            chapters: vec![
                chapter(1, "Chapter 1", "It was a dark night."),
                chapter(2, "Chapter 2", "Morning came."),
            ],
            discarded: 1,
            skipped: 0,
            warnings: vec![ExtractionWarning::UntypedNavigation],
        }
    }

    #[tokio::test]
    async fn test_write_next_to_book() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("novel.epub");

        let report = ChapterWriter::write(&result(), &source, &OutputConfig::default())
            .await
            .unwrap();

        assert_eq!(report.chapter_dir, temp.path().join("novel_chapters"));
        assert_eq!(report.output_files.len(), 2);
        assert!(report.zip_file.is_none());
        assert!(report.metadata_file.is_none());

        let first = std::fs::read_to_string(report.chapter_dir.join("01_Chapter_1.txt")).unwrap();
        assert_eq!(first, "Chapter 1\n\nIt was a dark night.");
    }

    #[tokio::test]
    async fn test_refuses_non_empty_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("novel.epub");
        let dir = temp.path().join("novel_chapters");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("keep.txt"), "mine").unwrap();

        let refused = ChapterWriter::write(&result(), &source, &OutputConfig::default()).await;
        assert!(matches!(refused, Err(EpubChapterError::OutputDirectory { .. })));

        let forced = OutputConfig {
            force: true,
            ..OutputConfig::default()
        };
        let report = ChapterWriter::write(&result(), &source, &forced).await.unwrap();
        assert_eq!(report.output_files.len(), 2);
    }

    #[tokio::test]
    async fn test_zip_and_metadata() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("out");
        let config = OutputConfig {
            output_root: Some(root.clone()),
            zip: true,
            include_metadata: true,
            force: false,
        };

        let report = ChapterWriter::write(&result(), Path::new("books/novel.epub"), &config)
            .await
            .unwrap();

        let zip_path = report.zip_file.unwrap();
        assert_eq!(zip_path, root.join("novel_chapters.zip"));
        let mut archive = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["novel_chapters/01_Chapter_1.txt", "novel_chapters/02_Chapter_2.txt"]
        );
        let mut body = String::new();
        archive
            .by_name("novel_chapters/02_Chapter_2.txt")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "Chapter 2\n\nMorning came.");

        let metadata: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.metadata_file.unwrap()).unwrap())
                .unwrap();
        assert_eq!(metadata["total_chapters"], 2);
        assert_eq!(metadata["effective_mode"], "strict");
        assert_eq!(metadata["chapters"][1]["filename"], "02_Chapter_2.txt");
        assert_eq!(metadata["warnings"][0]["kind"], "untyped_navigation");
    }
}
