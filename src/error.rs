use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to access {path}: {source}")]
    FileAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid source URL: {url}")]
    InvalidUrl { url: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to extract {archive}: {message}")]
    Extraction { archive: String, message: String },

    #[error("Unsupported archive format: {path}")]
    UnsupportedArchive { path: String },

    #[error("Failed to parse config file {path}")]
    ConfigParse {
        path: String,
        #[source]
        source: ConfigSyntaxError,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization failed for {path}: {message}")]
    Serialization { path: String, message: String },

    #[error("Encoding failed for {path}: {message}")]
    Encoding { path: String, message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },
}

/// Underlying syntax error of a config document.
#[derive(Error, Debug)]
pub enum ConfigSyntaxError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("top-level value must be a mapping, found {found}")]
    NotAMapping { found: String },
}

/// Coarse classification used for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Network,
    Extraction,
    ConfigParse,
    Serialization,
    Encoding,
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Io(_) | IngestError::FileAccess { .. } | IngestError::InvalidPath { .. } => {
                ErrorKind::Io
            }
            IngestError::InvalidUrl { .. }
            | IngestError::Network { .. }
            | IngestError::HttpStatus { .. }
            | IngestError::Timeout { .. } => ErrorKind::Network,
            IngestError::Extraction { .. } | IngestError::UnsupportedArchive { .. } => {
                ErrorKind::Extraction
            }
            IngestError::ConfigParse { .. } | IngestError::Config { .. } => ErrorKind::ConfigParse,
            IngestError::Serialization { .. } => ErrorKind::Serialization,
            IngestError::Encoding { .. } => ErrorKind::Encoding,
        }
    }

    pub(crate) fn file_access(path: &std::path::Path, source: std::io::Error) -> Self {
        IngestError::FileAccess {
            path: path.display().to_string(),
            source,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for IngestError {
    fn user_message(&self) -> String {
        match self {
            IngestError::FileAccess { path, source } => {
                format!("Could not access {}: {}", path, source)
            }
            IngestError::InvalidUrl { url } => format!("Invalid source URL: {}", url),
            IngestError::Network { message } => format!("Network error: {}", message),
            IngestError::HttpStatus { url, status } => {
                format!("Server answered HTTP {} for {}", status, url)
            }
            IngestError::Timeout { seconds } => {
                format!("Download timed out after {} seconds", seconds)
            }
            IngestError::Extraction { archive, message } => {
                format!("Could not extract {}: {}", archive, message)
            }
            IngestError::UnsupportedArchive { path } => {
                format!("{} is not a ZIP or 7z archive", path)
            }
            IngestError::ConfigParse { path, source } => {
                format!("Config file {} is malformed: {}", path, source)
            }
            IngestError::Config { message } => format!("Configuration error: {}", message),
            IngestError::InvalidPath { path } => format!("Invalid file path: {}", path),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            IngestError::InvalidUrl { .. } => Some(
                "source_URL must be an absolute http:// or https:// URL (e.g., https://example.com/data.zip)".to_string()
            ),
            IngestError::Network { .. } => Some(
                "Check your internet connection and that the host in source_URL is reachable.".to_string()
            ),
            IngestError::HttpStatus { .. } => Some(
                "Verify that source_URL points to a downloadable file.".to_string()
            ),
            IngestError::Timeout { .. } => Some(
                "Increase the timeout with --timeout or download.timeout in the config file.".to_string()
            ),
            IngestError::Extraction { .. } => Some(
                "The archive may be truncated. Delete local_data_path and run again to re-download it.".to_string()
            ),
            IngestError::UnsupportedArchive { .. } => Some(
                "Only ZIP and 7z archives can be extracted.".to_string()
            ),
            IngestError::ConfigParse { .. } | IngestError::Config { .. } => Some(
                "Check your configuration file syntax, or create one with --generate-config.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<url::ParseError> for IngestError {
    fn from(error: url::ParseError) -> Self {
        IngestError::InvalidUrl {
            url: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
