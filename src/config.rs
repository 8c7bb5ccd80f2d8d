use crate::common::config_mapping::read_config;
use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// On-disk pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub artifacts_root: PathBuf,
    pub data_ingestion: DataIngestionSection,
    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataIngestionSection {
    pub root_dir: PathBuf,
    #[serde(rename = "source_URL")]
    pub source_url: String,
    pub local_data_path: PathBuf,
    pub unzip_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Whole-request timeout in seconds.
    pub timeout: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: 300, // 5 minutes
            user_agent: format!("dataingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Validated inputs of the acquisition and extraction steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionConfig {
    source_url: Url,
    local_data_path: PathBuf,
    unzip_dir: PathBuf,
}

impl IngestionConfig {
    pub fn new(
        source_url: &str,
        local_data_path: impl Into<PathBuf>,
        unzip_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let source_url = parse_source_url(source_url)?;
        let local_data_path = local_data_path.into();
        let unzip_dir = unzip_dir.into();

        if local_data_path.as_os_str().is_empty() {
            return Err(IngestError::Config {
                message: "local_data_path must not be empty".to_string(),
            });
        }

        if unzip_dir.as_os_str().is_empty() {
            return Err(IngestError::Config {
                message: "unzip_dir must not be empty".to_string(),
            });
        }

        if local_data_path == unzip_dir {
            return Err(IngestError::Config {
                message: format!(
                    "local_data_path and unzip_dir must differ: {}",
                    unzip_dir.display()
                ),
            });
        }

        Ok(Self {
            source_url,
            local_data_path,
            unzip_dir,
        })
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn local_data_path(&self) -> &Path {
        &self.local_data_path
    }

    pub fn unzip_dir(&self) -> &Path {
        &self.unzip_dir
    }
}

/// Parses an absolute `http`/`https` URL with a host.
pub fn parse_source_url(s: &str) -> Result<Url> {
    let url = Url::parse(s.trim()).map_err(|_| IngestError::InvalidUrl { url: s.to_string() })?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(IngestError::InvalidUrl { url: s.to_string() }),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(IngestError::InvalidUrl { url: s.to_string() });
    }

    Ok(url)
}

pub const DEFAULT_CONFIG_PATHS: [&str; 3] = ["config/config.yaml", "config.yaml", "dataingest.yaml"];

impl PipelineConfig {
    pub fn sample() -> Self {
        Self {
            artifacts_root: PathBuf::from("artifacts"),
            data_ingestion: DataIngestionSection {
                root_dir: PathBuf::from("artifacts/data_ingestion"),
                source_url: "https://example.com/datasets/data.zip".to_string(),
                local_data_path: PathBuf::from("artifacts/data_ingestion/data.zip"),
                unzip_dir: PathBuf::from("artifacts/data_ingestion/data"),
            },
            download: DownloadConfig::default(),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(IngestError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let mapping = read_config(path)?;
        if mapping.is_empty() {
            return Err(IngestError::Config {
                message: format!("Configuration file is empty: {}", path.display()),
            });
        }

        mapping.deserialize().map_err(|e| match e {
            IngestError::Config { message } => IngestError::Config {
                message: format!("Invalid config file {}: {}", path.display(), message),
            },
            other => other,
        })
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                for default_path in &DEFAULT_CONFIG_PATHS {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Err(IngestError::Config {
                    message: format!(
                        "No configuration file found (looked for {})",
                        DEFAULT_CONFIG_PATHS.join(", ")
                    ),
                })
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref source_url) = cli_args.source_url {
            self.data_ingestion.source_url = source_url.clone();
        }

        if let Some(ref local_data_path) = cli_args.local_data_path {
            self.data_ingestion.local_data_path = local_data_path.clone();
        }

        if let Some(ref unzip_dir) = cli_args.unzip_dir {
            self.data_ingestion.unzip_dir = unzip_dir.clone();
        }

        if let Some(timeout) = cli_args.timeout {
            self.download.timeout = timeout;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(|e| IngestError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::file_access(parent, e))?;
        }

        std::fs::write(path, content).map_err(|e| IngestError::file_access(path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.ingestion_config()?;

        if self.download.timeout == 0 {
            return Err(IngestError::Config {
                message: "Download timeout must be greater than 0".to_string(),
            });
        }

        if self.artifacts_root.as_os_str().is_empty() {
            return Err(IngestError::Config {
                message: "artifacts_root must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn ingestion_config(&self) -> Result<IngestionConfig> {
        IngestionConfig::new(
            &self.data_ingestion.source_url,
            self.data_ingestion.local_data_path.clone(),
            self.data_ingestion.unzip_dir.clone(),
        )
    }

    /// Directories created before a run, outermost first.
    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs = vec![self.artifacts_root.as_path()];
        if !self.data_ingestion.root_dir.as_os_str().is_empty() {
            dirs.push(self.data_ingestion.root_dir.as_path());
        }
        dirs
    }

    pub fn download_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.download.timeout)
    }

    pub fn create_sample_config() -> String {
        serde_yaml::to_string(&Self::sample()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub source_url: Option<String>,
    pub local_data_path: Option<PathBuf>,
    pub unzip_dir: Option<PathBuf>,
    pub timeout: Option<u64>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_url(mut self, source_url: Option<String>) -> Self {
        self.source_url = source_url;
        self
    }

    pub fn with_local_data_path(mut self, path: Option<PathBuf>) -> Self {
        self.local_data_path = path;
        self
    }

    pub fn with_unzip_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.unzip_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }
}
