use anyhow::Context;
use clap::Parser;
use dataingest::{
    Cli, DataIngestion, IngestError, OutputFormatter, OutputMode, UserFriendlyError,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("Failed to initialise logging: {:#}", e);
        return 1;
    }

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let ingestion = match DataIngestion::from_cli(&cli) {
        Ok(ingestion) => ingestion,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&ingestion);
    }

    match ingestion.run().await {
        Ok(_) => 0,
        Err(e) => {
            ingestion.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

/// Installs the `tracing` subscriber. `RUST_LOG` wins over `-v`/`-q`.
fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid RUST_LOG directives: {}", directives))?,
        _ => EnvFilter::new(cli.log_filter()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

fn exit_code_for(error: &IngestError) -> i32 {
    match error {
        IngestError::InvalidUrl { .. } => 2,
        IngestError::Config { .. } | IngestError::ConfigParse { .. } => 3,
        IngestError::Network { .. } => 4,
        IngestError::HttpStatus { .. } => 5,
        IngestError::Timeout { .. } => 6,
        IngestError::Extraction { .. } | IngestError::UnsupportedArchive { .. } => 7,
        IngestError::Serialization { .. } | IngestError::Encoding { .. } => 8,
        IngestError::Io(_) | IngestError::FileAccess { .. } | IngestError::InvalidPath { .. } => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));

    match DataIngestion::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path.display());
            println!("\nTo use this configuration:");
            println!("  dataingest --config {}", config_path.display());
            println!("\nEdit source_URL and the paths under data_ingestion before running.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            exit_code_for(&e)
        }
    }
}

fn handle_dry_run(ingestion: &DataIngestion) -> i32 {
    let formatter = ingestion.output_formatter();
    let config = ingestion.config();

    let plan = match config.ingestion_config() {
        Ok(plan) => plan,
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code_for(&e);
        }
    };

    formatter.warning("DRY RUN MODE - nothing will be downloaded or extracted");
    formatter.print_separator();

    println!("  Source URL:      {}", plan.source_url());
    println!("  Archive path:    {}", plan.local_data_path().display());
    println!("  Extract into:    {}", plan.unzip_dir().display());
    println!("  Artifacts root:  {}", config.artifacts_root.display());
    println!("  Download timeout: {} seconds", config.download.timeout);

    formatter.print_separator();

    if plan.local_data_path().is_file() {
        formatter.success("Archive already present; the download would be skipped");
    } else {
        formatter.success("Archive not found locally; it would be downloaded");
    }

    formatter.success("Dry run completed successfully");
    0
}

fn print_startup_error(error: &IngestError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
