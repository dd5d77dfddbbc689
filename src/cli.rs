use clap::{Args, Parser, Subcommand};
use epub_chapters::{DetectionMode, ExtractionConfig, DEFAULT_FRONT_BACK_KEYWORDS};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "epub-split")]
#[command(about = "A CLI tool for splitting EPUB books into per-chapter text files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Root directory for chapter folders (defaults to each book's directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract chapters into text files
    Extract(ExtractArgs),

    /// Show how the table of contents is classified without writing anything
    Analyze(AnalyzeArgs),

    /// Check that books open and their table of contents resolves
    Validate(ValidateArgs),
}

/// Flags that change how the table of contents is classified and which
/// spine items count. Shared by every subcommand.
#[derive(Args)]
pub struct DetectionArgs {
    /// Additional front/back matter keyword (repeatable)
    #[arg(long = "keyword", value_name = "WORD")]
    pub keywords: Vec<String>,

    /// Use only the --keyword values instead of the built-in list
    #[arg(long, requires = "keywords")]
    pub only_keywords: bool,

    /// Drop part headings in loose mode too
    #[arg(long)]
    pub exclude_parts: bool,

    /// Leave non-linear spine items out of chapter ranges
    #[arg(long)]
    pub skip_non_linear: bool,
}

impl DetectionArgs {
    /// Extraction settings for these flags and the given length minimum.
    pub fn config(&self, min_chars: usize) -> ExtractionConfig {
        let mut front_back_keywords: Vec<String> = if self.only_keywords {
            Vec::new()
        } else {
            DEFAULT_FRONT_BACK_KEYWORDS.iter().map(|k| k.to_string()).collect()
        };
        front_back_keywords.extend(self.keywords.iter().cloned());

        ExtractionConfig {
            min_chars,
            front_back_keywords,
            exclude_parts: self.exclude_parts,
            include_non_linear: !self.skip_non_linear,
        }
    }
}

#[derive(Args)]
pub struct ExtractArgs {
    /// EPUB files or directories containing them
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    /// Chapter detection mode
    #[arg(short, long, value_enum, default_value_t = DetectionMode::Auto)]
    pub mode: DetectionMode,

    /// Discard chapters shorter than this many characters
    #[arg(long, default_value_t = epub_chapters::DEFAULT_MIN_CHARS)]
    pub min_chars: usize,

    #[command(flatten)]
    pub detection: DetectionArgs,

    /// Also bundle the chapter files into a zip archive
    #[arg(long)]
    pub zip: bool,

    /// Write metadata.json into the chapter folder
    #[arg(long)]
    pub metadata: bool,

    /// Write into a chapter folder that already has files
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// EPUB files or directories containing them
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    /// Chapter detection mode
    #[arg(short, long, value_enum, default_value_t = DetectionMode::Auto)]
    pub mode: DetectionMode,

    /// Output analysis to JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show every TOC entry with its classification
    #[arg(long)]
    pub detailed: bool,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// EPUB files or directories containing them
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    #[command(flatten)]
    pub detection: DetectionArgs,
}
