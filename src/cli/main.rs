//! aircraft-migrate: load aircraft JSON snapshots into TimescaleDB

mod output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aircraft_history::config::{AppConfig, redact_secrets_in_string};
use aircraft_history::migration::{
    DuckDbStore, LocalSource, MigrationError, Migrator, PositionStore, S3SnapshotSource,
    SnapshotSource, SourceType, TimescaleStore, Validator,
};

#[derive(Parser, Debug)]
#[command(
    name = "aircraft-migrate",
    version,
    about = "Migrate aircraft JSON snapshots into a TimescaleDB position history"
)]
struct Args {
    /// Local directory containing JSON snapshots
    #[arg(long, conflicts_with = "s3_bucket")]
    source_dir: Option<PathBuf>,

    /// S3 bucket holding snapshot objects
    #[arg(long)]
    s3_bucket: Option<String>,

    /// S3 key prefix [default: aircraft-data/]
    #[arg(long)]
    s3_prefix: Option<String>,

    /// Endpoint for S3-compatible storage
    #[arg(long)]
    s3_endpoint: Option<String>,

    /// S3 region
    #[arg(long)]
    s3_region: Option<String>,

    /// Database host [default: localhost]
    #[arg(long)]
    db_host: Option<String>,

    /// Database port [default: 5432]
    #[arg(long)]
    db_port: Option<u16>,

    /// Database name [default: aircraft_db]
    #[arg(long)]
    db_name: Option<String>,

    /// Database user [default: postgres]
    #[arg(long)]
    db_user: Option<String>,

    /// Database password
    #[arg(long, env = "AIRCRAFT_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Write to an embedded DuckDB file instead of TimescaleDB
    #[arg(long)]
    duckdb: Option<PathBuf>,

    /// Records per insert transaction [default: 1000]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum number of snapshots to process (at least 1)
    #[arg(long)]
    max_files: Option<usize>,

    /// Only run validation
    #[arg(long)]
    validate_only: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn init_tracing(level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults, then the config file, then environment, then flags
fn build_config(args: &Args) -> Result<AppConfig, MigrationError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env()?;

    if let Some(dir) = &args.source_dir {
        config.source.dir = Some(dir.clone());
        config.source.bucket = None;
    }
    if let Some(bucket) = &args.s3_bucket {
        config.source.bucket = Some(bucket.clone());
        config.source.dir = None;
    }
    if let Some(prefix) = &args.s3_prefix {
        config.source.prefix = prefix.clone();
    }
    if let Some(endpoint) = &args.s3_endpoint {
        config.s3.endpoint = Some(endpoint.clone());
    }
    if let Some(region) = &args.s3_region {
        config.s3.region = Some(region.clone());
    }

    if let Some(host) = &args.db_host {
        config.destination.host = host.clone();
    }
    if let Some(port) = args.db_port {
        config.destination.port = port;
    }
    if let Some(name) = &args.db_name {
        config.destination.database = name.clone();
    }
    if let Some(user) = &args.db_user {
        config.destination.user = user.clone();
    }
    if let Some(password) = &args.db_password {
        config.destination.password = Some(password.clone());
    }
    if let Some(path) = &args.duckdb {
        config.destination.duckdb = Some(path.clone());
    }

    if let Some(batch_size) = args.batch_size {
        config.migration.batch_size = batch_size;
    }
    if args.max_files.is_some() {
        config.migration.max_files = args.max_files;
    }
    config.migration.show_progress = !args.no_progress && std::io::stderr().is_terminal();

    config.validate()?;
    Ok(config)
}

async fn open_store(config: &AppConfig) -> Result<Box<dyn PositionStore>, MigrationError> {
    match &config.destination.duckdb {
        Some(path) => Ok(Box::new(DuckDbStore::open(path)?)),
        None => Ok(Box::new(TimescaleStore::connect(&config.destination).await?)),
    }
}

async fn open_source(config: &AppConfig) -> Result<Box<dyn SnapshotSource>, MigrationError> {
    match config.source_type()? {
        SourceType::Local(dir) => Ok(Box::new(LocalSource::new(dir))),
        SourceType::S3 { bucket, prefix } => {
            let source = config.s3_source(&bucket, &prefix);
            Ok(Box::new(S3SnapshotSource::connect(source).await))
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    info!("Destination: {}", config.destination.display());

    let store = open_store(&config).await?;
    store
        .ensure_schema(&config.schema)
        .await
        .map_err(MigrationError::from)?;

    if args.validate_only {
        let report = Validator::new(store.as_ref())
            .validate()
            .await
            .map_err(MigrationError::from)
            .context("Validation failed")?;
        println!("{}", output::format_report(&report));
        return Ok(());
    }

    let source = open_source(&config).await?;
    let progress = Migrator::new(&config.migration, store.as_ref())
        .run(source.as_ref())
        .await?;
    println!("{}", output::format_summary(&progress));

    match Validator::new(store.as_ref()).validate().await {
        Ok(report) => println!("{}", output::format_report(&report)),
        Err(e) => warn!("Validation failed: {}", e),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<MigrationError>() {
                Some(err) => err.user_message(),
                None => format!("{:#}", e),
            };
            eprintln!("Error: {}", redact_secrets_in_string(&message));
            ExitCode::FAILURE
        }
    }
}
