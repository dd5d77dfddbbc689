mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AnalyzeArgs, Cli, Commands, ExtractArgs, ValidateArgs};
use epub_chapters::{
    BookAnalysis, ChapterExtractor, ChapterWriter, DetectionMode, EpubChapterError,
    OutputConfig, Result, SourceCollector, DEFAULT_MIN_CHARS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(log_level).into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Extract(args) => handle_extract_command(args, &cli.output).await,
        Commands::Analyze(args) => handle_analyze_command(args).await,
        Commands::Validate(args) => handle_validate_command(args).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_extract_command(args: &ExtractArgs, output_root: &Option<PathBuf>) -> Result<()> {
    let books = SourceCollector::collect(&args.sources).await?;
    info!("Starting extraction of {} books", books.len());

    let extractor = Arc::new(ChapterExtractor::new(args.detection.config(args.min_chars))?);
    let output = OutputConfig {
        output_root: output_root.clone(),
        zip: args.zip,
        include_metadata: args.metadata,
        force: args.force,
    };

    let mut failed = 0;
    for (idx, book) in books.iter().enumerate() {
        info!("Processing book {}/{}: {}", idx + 1, books.len(), book.display());

        let extraction = {
            let extractor = Arc::clone(&extractor);
            let path = book.clone();
            let mode = args.mode;
            tokio::task::spawn_blocking(move || extractor.extract(&path, mode))
                .await
                .map_err(anyhow::Error::from)?
        };

        let result = match extraction {
            Ok(result) => result,
            Err(e) if e.is_book_problem() => {
                error!("✗ {}: {}", book.display(), e);
                failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if result.chapters.is_empty() {
            warn!(
                "No chapter of {} reached {} characters, nothing written",
                book.display(),
                args.min_chars
            );
            continue;
        }

        let report = ChapterWriter::write(&result, book, &output).await?;

        info!(
            "Created {} chapter files for '{}' ({} mode, {} discarded, {} TOC entries skipped):",
            report.output_files.len(),
            result.book_stem,
            result.effective_mode,
            result.discarded,
            result.skipped
        );
        for output_file in &report.output_files {
            info!("  - {}", output_file.display());
        }
        if let Some(zip_file) = &report.zip_file {
            info!("  - {} (archive)", zip_file.display());
        }
        if let Some(metadata_file) = &report.metadata_file {
            info!("  - {} (metadata)", metadata_file.display());
        }
    }

    if failed > 0 {
        return Err(EpubChapterError::BooksFailed {
            failed,
            total: books.len(),
        });
    }

    info!("Extraction completed successfully!");
    Ok(())
}

async fn analyze_book(
    extractor: &Arc<ChapterExtractor>,
    path: &Path,
    mode: DetectionMode,
) -> Result<BookAnalysis> {
    let extractor = Arc::clone(extractor);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extractor.analyze(&path, mode))
        .await
        .map_err(anyhow::Error::from)?
}

async fn handle_analyze_command(args: &AnalyzeArgs) -> Result<()> {
    let books = SourceCollector::collect(&args.sources).await?;
    info!("Starting analysis of {} books", books.len());

    let extractor = Arc::new(ChapterExtractor::new(
        args.detection.config(DEFAULT_MIN_CHARS),
    )?);
    let mut all_analyses = Vec::new();

    for book in books {
        info!("Analyzing: {}", book.display());
        let analysis = match analyze_book(&extractor, &book, args.mode).await {
            Ok(analysis) => analysis,
            Err(e) if e.is_book_problem() => {
                error!("✗ {}: {}", book.display(), e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let kept = analysis.entries.iter().filter(|e| e.kept).count();
        println!("\n=== Analysis for '{}' ===", book.display());
        println!("Package document: {}", analysis.package_path);
        println!("Table of contents: {}", analysis.toc_format);
        println!("Spine items: {}", analysis.spine.len());
        println!("TOC entries: {}", analysis.entries.len());
        println!("Numbered chapters: {}", analysis.numbered_chapters);
        println!("Effective mode: {}", analysis.effective_mode);
        println!("Entries kept: {}", kept);
        if !analysis.warnings.is_empty() {
            println!("Warnings: {}", analysis.warnings.len());
        }

        if args.detailed {
            println!("\nTOC Entries:");
            for entry in &analysis.entries {
                let anchor = entry
                    .anchor
                    .as_ref()
                    .map(|a| format!("#{}", a))
                    .unwrap_or_default();
                println!(
                    "  [{}] {}{} ({}, spine {}: {}{})",
                    if entry.kept { "x" } else { " " },
                    "  ".repeat(entry.depth),
                    entry.title,
                    entry.classification,
                    entry.spine_index,
                    entry.target_file,
                    anchor
                );
            }
            for warning in &analysis.warnings {
                println!("  ! {}", warning);
            }
        }

        all_analyses.push(analysis);
    }

    // Write JSON output if requested
    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&all_analyses)
            .context("Failed to serialize analysis results")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON analysis file")?;

        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}

async fn handle_validate_command(args: &ValidateArgs) -> Result<()> {
    let books = SourceCollector::collect(&args.sources).await?;
    info!("Validating {} books", books.len());

    let extractor = Arc::new(ChapterExtractor::new(
        args.detection.config(DEFAULT_MIN_CHARS),
    )?);

    let mut valid_books = Vec::new();
    let mut invalid_books = Vec::new();

    for book in &books {
        let extractor = Arc::clone(&extractor);
        let path = book.clone();
        let outcome = tokio::task::spawn_blocking(move || extractor.validate(&path))
            .await
            .map_err(anyhow::Error::from)?;

        match outcome {
            Ok(analysis) => {
                info!(
                    "✓ Valid: {} ({} spine items, {} TOC entries from {})",
                    book.display(),
                    analysis.spine.len(),
                    analysis.entries.len(),
                    analysis.toc_format
                );
                valid_books.push(book);
            }
            Err(e) => {
                error!("✗ Invalid: {} - {}", book.display(), e);
                invalid_books.push((book, e.to_string()));
            }
        }
    }

    println!("\n=== Validation Summary ===");
    println!("Valid books: {}/{}", valid_books.len(), books.len());

    if !invalid_books.is_empty() {
        println!("Invalid books:");
        let invalid_count = invalid_books.len();
        for (book, error) in invalid_books {
            println!("  - {}: {}", book.display(), error);
        }
        return Err(EpubChapterError::BooksFailed {
            failed: invalid_count,
            total: books.len(),
        });
    }

    println!("All books are valid!");
    Ok(())
}
