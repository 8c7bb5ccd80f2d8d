pub mod acquire;
pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod extractor;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, DownloadConfig, IngestionConfig, PipelineConfig};
pub use error::{ErrorKind, IngestError, Result, UserFriendlyError};

pub use acquire::{AcquireOutcome, DownloadProgress, FileAcquirer};
pub use common::{
    create_directories, decode_image_base64, encode_image_base64, file_size_kb, load_binary,
    load_json, read_config, save_binary, save_json, ConfigMapping,
};
pub use extractor::{ArchiveExtractor, ArchiveFormat, ExtractionProgress, IngestionReport};
pub use ui::{OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{error, info};

const STAGE_NAME: &str = "Data Ingestion stage";

/// Runs one data ingestion stage: directories, download, extraction, report.
pub struct DataIngestion {
    config: PipelineConfig,
    report_path: Option<PathBuf>,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl DataIngestion {
    pub fn new(config: PipelineConfig, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let progress_enabled = !quiet && output_mode == OutputMode::Human;

        Self {
            config,
            report_path: None,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(progress_enabled),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Ok(Self::new(config, output_mode, cli_args.verbosity_level(), cli_args.quiet)
            .with_report_path(cli_args.report.clone()))
    }

    pub fn with_report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    pub async fn run(&self) -> Result<IngestionReport> {
        info!(">>>>> stage {} started <<<<<", STAGE_NAME);

        let report = self.execute().await.map_err(|e| {
            error!(error = %e, kind = ?e.kind(), "stage {} failed", STAGE_NAME);
            e
        })?;

        info!(">>>>> stage {} completed <<<<<", STAGE_NAME);
        Ok(report)
    }

    async fn execute(&self) -> Result<IngestionReport> {
        let ingestion = self.config.ingestion_config()?;

        self.output_formatter.start_operation("Starting data ingestion");
        self.prepare_directories()?;

        let acquired = self.download_file(&ingestion).await?;
        let progress = self.extract_archive(&ingestion).await?;

        let report = IngestionReport::build(&ingestion, &acquired, &progress);

        if let Some(ref path) = self.report_path {
            report.save_json(path)?;
            info!(path = %path.display(), "ingestion report written");
        }

        self.output_formatter.print_ingestion_summary(&report);
        Ok(report)
    }

    fn prepare_directories(&self) -> Result<()> {
        let dirs = self.config.directories();
        create_directories(&dirs)?;

        for dir in dirs {
            self.output_formatter
                .info(&format!("Created directory: {}", dir.display()));
        }
        Ok(())
    }

    async fn download_file(&self, ingestion: &IngestionConfig) -> Result<AcquireOutcome> {
        self.output_formatter.start_operation("Acquiring archive");

        let download_progress = self.progress_manager.create_bytes_progress(0, "Connecting...");
        let progress_callback = {
            let pb = download_progress.clone();
            move |progress: DownloadProgress| {
                ui::progress::update_download_progress(&pb, &progress);
            }
        };

        let acquirer = FileAcquirer::new()
            .with_timeout(self.config.download_timeout_duration())
            .with_user_agent(self.config.download.user_agent.clone())
            .with_progress(progress_callback);

        let outcome = acquirer
            .ensure_downloaded(ingestion.source_url().as_str(), ingestion.local_data_path())
            .await;

        match outcome {
            Ok(AcquireOutcome::AlreadyPresent { ref path, size_bytes }) => {
                download_progress.finish_and_clear();
                self.output_formatter.info(&format!(
                    "File already exists: {} ({})",
                    path.display(),
                    common::artifacts::format_kb(size_bytes)
                ));
            }
            Ok(AcquireOutcome::Downloaded { ref path, .. }) => {
                ui::progress::finish_progress_with_summary(
                    &download_progress,
                    &format!("Downloaded {}", path.display()),
                    download_progress.elapsed(),
                );
            }
            Err(_) => download_progress.abandon(),
        }

        outcome
    }

    async fn extract_archive(&self, ingestion: &IngestionConfig) -> Result<ExtractionProgress> {
        self.output_formatter.start_operation("Extracting archive");

        let spinner = self
            .progress_manager
            .create_spinner(&format!("Extracting into {}", ingestion.unzip_dir().display()));

        let archive = ingestion.local_data_path().to_path_buf();
        let destination = ingestion.unzip_dir().to_path_buf();
        let archive_name = archive.display().to_string();

        let result = task::spawn_blocking(move || {
            ArchiveExtractor::new().extract_all(&archive, &destination)
        })
        .await
        .map_err(|e| IngestError::Extraction {
            archive: archive_name,
            message: format!("Extraction task failed: {}", e),
        })
        .and_then(|inner| inner);

        match result {
            Ok(ref progress) => ui::progress::finish_progress_with_summary(
                &spinner,
                &format!("Extracted {} files", progress.files_extracted),
                progress.elapsed(),
            ),
            Err(_) => spinner.abandon(),
        }

        result
    }

    /// Writes a sample YAML configuration to `output_path`.
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        PipelineConfig::sample().save_to_file(output_path)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn handle_error(&self, error: &IngestError) {
        self.progress_manager.clear();
        self.output_formatter.print_user_friendly_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataIngestionSection;
    use std::collections::BTreeSet;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn pipeline_config(root: &Path, source_url: &str) -> PipelineConfig {
        PipelineConfig {
            artifacts_root: root.join("artifacts"),
            data_ingestion: DataIngestionSection {
                root_dir: root.join("artifacts/data_ingestion"),
                source_url: source_url.to_string(),
                local_data_path: root.join("artifacts/data_ingestion/data.zip"),
                unzip_dir: root.join("artifacts/data_ingestion/data"),
            },
            download: DownloadConfig::default(),
        }
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_run_with_archive_already_present() {
        let temp = TempDir::new().unwrap();
        // Nothing listens on port 9; the run must not touch the network.
        let config = pipeline_config(temp.path(), "http://127.0.0.1:9/data.zip");
        write_zip(
            &config.data_ingestion.local_data_path,
            &[("a", "alpha"), ("b", "bravo"), ("c", "charlie")],
        );

        let ingestion = DataIngestion::new(config.clone(), OutputMode::Plain, 0, true);
        let report = ingestion.run().await.unwrap();

        assert!(!report.archive.downloaded);
        assert_eq!(report.extraction_summary.total_files, 3);

        let names: BTreeSet<String> = fs::read_dir(&config.data_ingestion.unzip_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, BTreeSet::from(["a".into(), "b".into(), "c".into()]));
        assert_eq!(
            fs::read_to_string(config.data_ingestion.unzip_dir.join("c")).unwrap(),
            "charlie"
        );
    }

    #[tokio::test]
    async fn test_run_writes_report() {
        let temp = TempDir::new().unwrap();
        let config = pipeline_config(temp.path(), "http://127.0.0.1:9/data.zip");
        write_zip(&config.data_ingestion.local_data_path, &[("x.csv", "1,2,3")]);

        let report_path = temp.path().join("reports/ingestion.json");
        let ingestion = DataIngestion::new(config, OutputMode::Plain, 0, true)
            .with_report_path(Some(report_path.clone()));
        ingestion.run().await.unwrap();

        let saved = load_json(&report_path).unwrap();
        assert_eq!(saved.get_str("archive.format"), Some("zip"));
        assert_eq!(
            saved.get_path("extraction_summary.total_files"),
            Some(&serde_json::json!(1))
        );
    }

    #[tokio::test]
    async fn test_run_without_archive_and_unreachable_source() {
        let temp = TempDir::new().unwrap();
        let config = pipeline_config(temp.path(), "http://127.0.0.1:9/data.zip");

        let ingestion = DataIngestion::new(config.clone(), OutputMode::Plain, 0, true);
        let err = ingestion.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!config.data_ingestion.unzip_dir.exists());
        // Directories are prepared before the download starts.
        assert!(config.data_ingestion.root_dir.is_dir());
    }

    #[tokio::test]
    async fn test_run_with_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let config = pipeline_config(temp.path(), "http://127.0.0.1:9/data.zip");
        fs::create_dir_all(&config.data_ingestion.root_dir).unwrap();
        fs::write(&config.data_ingestion.local_data_path, b"PK\x03\x04 truncated").unwrap();

        let ingestion = DataIngestion::new(config, OutputMode::Plain, 0, true);
        let err = ingestion.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config/config.yaml");

        DataIngestion::generate_sample_config(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("source_URL"));

        let loaded = PipelineConfig::load_from_file(&config_path).unwrap();
        assert!(loaded.validate().is_ok());
    }
}
