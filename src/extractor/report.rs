use crate::acquire::AcquireOutcome;
use crate::common::artifacts::format_kb;
use crate::common::config_mapping::save_json;
use crate::config::IngestionConfig;
use crate::error::{IngestError, Result};
use crate::extractor::ExtractionProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub source_url: String,
    pub archive: ArchiveInfo,
    pub extraction_summary: ExtractionSummary,
    pub files: Vec<FileInfo>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub path: String,
    pub format: String,
    pub size_bytes: u64,
    pub size: String,
    pub downloaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub destination: String,
    pub total_files: usize,
    pub total_bytes: u64,
    pub directories_created: usize,
    pub extraction_duration: Duration,
    pub files_by_extension: BTreeMap<String, usize>,
    pub largest_file: Option<FileInfo>,
    pub average_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub relative_path: String,
    pub extension: String,
    pub size: u64,
}

impl FileInfo {
    fn new(relative_path: &Path, size: u64) -> Self {
        let extension = relative_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        Self {
            relative_path: relative_path.to_string_lossy().replace('\\', "/"),
            extension,
            size,
        }
    }
}

impl IngestionReport {
    pub fn build(
        config: &IngestionConfig,
        acquired: &AcquireOutcome,
        progress: &ExtractionProgress,
    ) -> Self {
        let files: Vec<FileInfo> = progress
            .files
            .iter()
            .map(|relative| {
                let size = fs::metadata(config.unzip_dir().join(relative))
                    .map(|m| m.len())
                    .unwrap_or(0);
                FileInfo::new(relative, size)
            })
            .collect();

        let archive = ArchiveInfo {
            path: acquired.path().display().to_string(),
            format: progress
                .format
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
            size_bytes: acquired.size_bytes(),
            size: format_kb(acquired.size_bytes()),
            downloaded: acquired.was_downloaded(),
        };

        let extraction_summary = summarize(config.unzip_dir(), &files, progress);

        Self {
            source_url: config.source_url().to_string(),
            archive,
            extraction_summary,
            files,
            generated_at: Utc::now(),
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IngestError::file_access(parent, e))?;
        }
        save_json(path, self)
    }
}

fn summarize(destination: &Path, files: &[FileInfo], progress: &ExtractionProgress) -> ExtractionSummary {
    let mut files_by_extension: BTreeMap<String, usize> = BTreeMap::new();
    let mut largest_file: Option<&FileInfo> = None;

    for file in files {
        let ext = if file.extension.is_empty() {
            "no_extension".to_string()
        } else {
            file.extension.clone()
        };

        *files_by_extension.entry(ext).or_insert(0) += 1;

        if largest_file.map_or(true, |f| file.size > f.size) {
            largest_file = Some(file);
        }
    }

    let average_file_size = if files.is_empty() {
        0
    } else {
        progress.bytes_written / files.len() as u64
    };

    ExtractionSummary {
        destination: destination.display().to_string(),
        total_files: progress.files_extracted,
        total_bytes: progress.bytes_written,
        directories_created: progress.directories_created,
        extraction_duration: progress.elapsed(),
        files_by_extension,
        largest_file: largest_file.cloned(),
        average_file_size,
    }
}
