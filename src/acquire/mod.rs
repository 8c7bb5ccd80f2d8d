pub mod downloader;

pub use downloader::{AcquireOutcome, DownloadProgress, FileAcquirer};
