pub mod archive;
pub mod classifier;
pub mod extractor;
pub mod namer;
pub mod package;
pub mod pipeline;
pub mod slicer;
pub mod sources;
pub mod toc;
pub mod writer;
pub mod xml;

pub use archive::EpubArchive;
pub use classifier::{ChapterClassifier, Selection};
pub use extractor::TextExtractor;
pub use namer::ChapterNamer;
pub use package::PackageReader;
pub use pipeline::ChapterExtractor;
pub use slicer::SpineSlicer;
pub use sources::SourceCollector;
pub use toc::{ParsedToc, TocParser};
pub use writer::ChapterWriter;
