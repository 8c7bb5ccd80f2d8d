use crate::error::{IngestError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ZIP_MAGIC: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];
const SEVEN_ZIP_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
}

impl ArchiveFormat {
    /// Sniffs the magic bytes, falling back to the file extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = [0u8; 6];
        let read = File::open(path)
            .and_then(|mut f| read_up_to(&mut f, &mut header))
            .map_err(|e| IngestError::file_access(path, e))?;
        let header = &header[..read];

        if ZIP_MAGIC.iter().any(|magic| header.starts_with(magic)) {
            return Ok(ArchiveFormat::Zip);
        }
        if header.starts_with(SEVEN_ZIP_MAGIC) {
            return Ok(ArchiveFormat::SevenZip);
        }

        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("zip") => Ok(ArchiveFormat::Zip),
            Some("7z") => Ok(ArchiveFormat::SevenZip),
            _ => Err(IngestError::UnsupportedArchive {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZip => "7z",
        }
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[derive(Debug, Clone)]
pub struct ExtractionProgress {
    pub format: Option<ArchiveFormat>,
    pub files_extracted: usize,
    pub directories_created: usize,
    pub bytes_written: u64,
    /// Extracted file paths relative to the destination directory.
    pub files: Vec<PathBuf>,
    pub start_time: Instant,
    finished: Option<Duration>,
}

impl ExtractionProgress {
    pub fn new() -> Self {
        Self {
            format: None,
            files_extracted: 0,
            directories_created: 0,
            bytes_written: 0,
            files: Vec::new(),
            start_time: Instant::now(),
            finished: None,
        }
    }

    pub fn record_file(&mut self, relative_path: PathBuf, bytes: u64) {
        self.files_extracted += 1;
        self.bytes_written += bytes;
        self.files.push(relative_path);
    }

    pub fn record_directory(&mut self) {
        self.directories_created += 1;
    }

    pub fn finish(&mut self) {
        self.finished = Some(self.start_time.elapsed());
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(|| self.start_time.elapsed())
    }
}

impl Default for ExtractionProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Unpacks ZIP and 7z archives into a directory.
///
/// Existing files with the same name are overwritten; other files in the
/// destination are left untouched. ZIP entries keep their modification time
/// and, on Unix, their mode bits with owner write always set.
#[derive(Debug, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_all(&self, archive_path: &Path, destination_dir: &Path) -> Result<ExtractionProgress> {
        fs::create_dir_all(destination_dir)
            .map_err(|e| IngestError::file_access(destination_dir, e))?;

        let format = ArchiveFormat::detect(archive_path)?;
        info!(
            archive = %archive_path.display(),
            destination = %destination_dir.display(),
            format = format.as_str(),
            "extracting archive"
        );

        let mut progress = ExtractionProgress::new();
        progress.format = Some(format);

        match format {
            ArchiveFormat::Zip => self.extract_zip(archive_path, destination_dir, &mut progress)?,
            ArchiveFormat::SevenZip => {
                self.extract_seven_zip(archive_path, destination_dir, &mut progress)?
            }
        }

        progress.finish();
        info!(
            destination = %destination_dir.display(),
            files = progress.files_extracted,
            bytes = progress.bytes_written,
            "extracted archive"
        );

        Ok(progress)
    }

    fn extract_zip(
        &self,
        archive_path: &Path,
        destination_dir: &Path,
        progress: &mut ExtractionProgress,
    ) -> Result<()> {
        let extraction_error = |message: String| IngestError::Extraction {
            archive: archive_path.display().to_string(),
            message,
        };

        let file = File::open(archive_path).map_err(|e| IngestError::file_access(archive_path, e))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| extraction_error(e.to_string()))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| extraction_error(e.to_string()))?;

            let relative_path = entry
                .enclosed_name()
                .map(Path::to_path_buf)
                .ok_or_else(|| extraction_error(format!("unsafe entry path: {}", entry.name())))?;
            let out_path = destination_dir.join(&relative_path);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| IngestError::file_access(&out_path, e))?;
                progress.record_directory();
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| IngestError::file_access(parent, e))?;
            }

            let mut out_file =
                File::create(&out_path).map_err(|e| IngestError::file_access(&out_path, e))?;
            let bytes = io::copy(&mut entry, &mut out_file)
                .map_err(|e| extraction_error(format!("{}: {}", relative_path.display(), e)))?;
            drop(out_file);

            // Owner write stays set so a later run can overwrite the file.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let mode = (mode & 0o7777) | 0o200;
                    if let Err(e) = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode)) {
                        warn!(
                            path = %out_path.display(),
                            mode = %format!("{:o}", mode),
                            error = %e,
                            "failed to apply entry permissions"
                        );
                    }
                }
            }

            if let Some(mtime) = zip_entry_mtime(entry.last_modified()) {
                if let Err(e) = filetime::set_file_mtime(&out_path, mtime) {
                    debug!(path = %out_path.display(), error = %e, "failed to apply entry mtime");
                }
            }

            debug!(entry = %relative_path.display(), bytes, "extracted");
            progress.record_file(relative_path, bytes);
        }

        Ok(())
    }

    fn extract_seven_zip(
        &self,
        archive_path: &Path,
        destination_dir: &Path,
        progress: &mut ExtractionProgress,
    ) -> Result<()> {
        let mut extracted: Vec<(PathBuf, bool)> = Vec::new();
        let mut unsafe_entry: Option<String> = None;

        sevenz_rust::decompress_file_with_extract_fn(
            archive_path,
            destination_dir,
            |entry, reader, dest| {
                if entry.name().is_empty() {
                    return Ok(true);
                }
                let relative_path = PathBuf::from(entry.name());
                if !is_enclosed(&relative_path) {
                    unsafe_entry = Some(entry.name().to_string());
                    return Ok(false);
                }
                let keep_going = sevenz_rust::default_entry_extract_fn(entry, reader, dest)?;
                extracted.push((relative_path, entry.is_directory()));
                Ok(keep_going)
            },
        )
        .map_err(|e| IngestError::Extraction {
            archive: archive_path.display().to_string(),
            message: e.to_string(),
        })?;

        if let Some(name) = unsafe_entry {
            return Err(IngestError::Extraction {
                archive: archive_path.display().to_string(),
                message: format!("unsafe entry path: {}", name),
            });
        }

        for (relative_path, is_directory) in extracted {
            if is_directory {
                progress.record_directory();
                continue;
            }
            let out_path = destination_dir.join(&relative_path);
            let bytes = match fs::metadata(&out_path) {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!(path = %out_path.display(), error = %e, "extracted entry not found on disk");
                    0
                }
            };
            debug!(entry = %relative_path.display(), bytes, "extracted");
            progress.record_file(relative_path, bytes);
        }

        Ok(())
    }
}

fn is_enclosed(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn zip_entry_mtime(modified: zip::DateTime) -> Option<filetime::FileTime> {
    let timestamp = chrono::NaiveDate::from_ymd_opt(
        modified.year() as i32,
        modified.month() as u32,
        modified.day() as u32,
    )?
    .and_hms_opt(
        modified.hour() as u32,
        modified.minute() as u32,
        modified.second() as u32,
    )?
    .and_utc()
    .timestamp();

    Some(filetime::FileTime::from_unix_time(timestamp, 0))
}
