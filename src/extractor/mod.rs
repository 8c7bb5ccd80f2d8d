pub mod archive_extractor;
pub mod report;

pub use archive_extractor::{ArchiveExtractor, ArchiveFormat, ExtractionProgress};
pub use report::{ArchiveInfo, ExtractionSummary, FileInfo, IngestionReport};
