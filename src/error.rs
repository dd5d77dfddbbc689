use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpubChapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Cannot read EPUB archive {path}: {reason}")]
    Archive { path: String, reason: String },

    #[error("No package document found in {path}")]
    PackageNotFound { path: String },

    #[error("Package document {path} has an empty spine")]
    MissingSpine { path: String },

    #[error("No usable table of contents in {path}")]
    MissingToc { path: String },

    #[error("No chapters found: {reason}")]
    NoChaptersFound { reason: String },

    #[error("Malformed XML in {path}: {reason}")]
    MalformedXml { path: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Output directory error: {reason}")]
    OutputDirectory { reason: String },

    #[error("{failed} of {total} books failed")]
    BooksFailed { failed: usize, total: usize },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl EpubChapterError {
    /// Failures caused by one book rather than the environment; the CLI
    /// reports them and moves on to the next source.
    pub fn is_book_problem(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. }
                | Self::Archive { .. }
                | Self::PackageNotFound { .. }
                | Self::MissingSpine { .. }
                | Self::MissingToc { .. }
                | Self::NoChaptersFound { .. }
                | Self::MalformedXml { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EpubChapterError>;
