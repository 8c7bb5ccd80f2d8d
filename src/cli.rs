use crate::config::{parse_source_url, CliOverrides, PipelineConfig};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dataingest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download and unpack a dataset archive")]
#[command(
    long_about = "dataingest fetches a dataset archive (ZIP or 7z) from a URL, unless it is \
                  already on disk, and extracts it into the configured directory."
)]
#[command(after_help = "EXAMPLES:\n  \
    dataingest --config config/config.yaml\n  \
    dataingest --source-url https://example.com/data.zip --unzip-dir artifacts/data\n  \
    dataingest --report artifacts/ingestion_report.json -v\n  \
    dataingest --generate-config --config config/config.yaml")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, help = "Path to YAML, JSON or TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Override the archive URL
    #[arg(long, value_parser = validate_source_url)]
    pub source_url: Option<String>,

    /// Override where the downloaded archive is stored
    #[arg(long)]
    pub local_data_path: Option<PathBuf>,

    /// Override the extraction directory
    #[arg(long)]
    pub unzip_dir: Option<PathBuf>,

    /// Download timeout in seconds
    #[arg(long, help = "Timeout for the download (seconds)")]
    pub timeout: Option<u64>,

    /// Write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "Validate the configuration and print the plan without downloading")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_source_url(self.source_url.clone())
            .with_local_data_path(self.local_data_path.clone())
            .with_unzip_dir(self.unzip_dir.clone())
            .with_timeout(self.timeout)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "dataingest=warn";
        }

        match self.verbose {
            0 => "dataingest=info",
            1 => "dataingest=debug",
            _ => "dataingest=trace",
        }
    }
}

pub fn validate_source_url(s: &str) -> std::result::Result<String, String> {
    parse_source_url(s)
        .map(|_| s.trim().to_string())
        .map_err(|_| "Only absolute http:// or https:// URLs with a host are supported".to_string())
}
