use crate::error::{EpubChapterError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct SourceCollector;

impl SourceCollector {
    /// Expand the command-line sources into book paths. Directories are
    /// searched recursively for `.epub` files; plain files are taken as given.
    pub async fn collect(sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut books = Vec::new();

        for source in sources {
            let metadata = fs::metadata(source)
                .await
                .map_err(|_| EpubChapterError::FileNotFound {
                    path: source.display().to_string(),
                })?;

            if metadata.is_dir() {
                let dir = source.clone();
                let found = tokio::task::spawn_blocking(move || Self::scan_directory(&dir))
                    .await
                    .map_err(anyhow::Error::from)?;
                info!("Found {} EPUB files under {}", found.len(), source.display());
                books.extend(found);
            } else {
                if !is_epub(source) {
                    warn!("{} does not have an .epub extension", source.display());
                }
                books.push(source.clone());
            }
        }

        let mut seen = std::collections::HashSet::new();
        books.retain(|book| seen.insert(book.clone()));
        Ok(books)
    }

    /// Every `.epub` below `dir`, sorted by path.
    pub fn scan_directory(dir: &Path) -> Vec<PathBuf> {
        let mut books: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_epub(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        books.sort();
        debug!("Scanned {}: {:?}", dir.display(), books);
        books
    }
}

fn is_epub(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("epub"))
}
