//! CLI entry point for the taxi ETL tool.
//!
//! `run` reads trips, writes daily aggregates to local files and pushes them
//! to the configured bucket. `bucket` exposes the individual bucket
//! operations.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use taxi_etl::config::StorageSettings;
use taxi_etl::pipeline::{PipelineOptions, run_pipeline};
use taxi_etl::source::{CsvTripSource, DEFAULT_ROW_LIMIT};
use taxi_etl::storage::S3BucketStore;
use taxi_etl::sync::BucketSync;
use tracing::{debug, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "taxi_etl")]
#[command(about = "Daily taxi fare aggregation with bucket upload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate trips by pickup day, write CSV output, upload it
    Run {
        /// Output prefix; files are written as <OUTPUT>-SSSSS-of-NNNNN.csv
        #[arg(long, required = true)]
        output: String,

        /// CSV export of the trip table
        #[arg(short, long, default_value = "trips.csv")]
        input: PathBuf,

        /// Maximum number of rows to read (0 = all)
        #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
        limit: usize,

        /// Number of output shards
        #[arg(long, default_value_t = 1)]
        num_shards: usize,

        /// Bucket to upload to (overrides TAXI_ETL_BUCKET)
        #[arg(long)]
        bucket: Option<String>,

        /// Upload this whole directory instead of the written shards
        /// (overrides TAXI_ETL_UPLOAD_DIR)
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Only write local files
        #[arg(long, default_value_t = false)]
        no_upload: bool,

        /// Extra pipeline options, accepted and ignored
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
        pipeline_args: Vec<String>,
    },
    /// Bucket management
    Bucket {
        #[command(subcommand)]
        command: BucketCommand,
    },
}

#[derive(Subcommand)]
enum BucketCommand {
    /// List bucket names
    List,
    /// List buckets with their object counts
    Counts,
    /// Show the object count of one bucket
    Details { bucket: String },
    /// Check whether a bucket exists
    Exists { bucket: String },
    /// Create a bucket if it does not exist
    Create { bucket: String },
    /// Delete every object in a bucket, then the bucket
    Delete { bucket: String },
    /// Upload a single file
    UploadFile {
        bucket: String,
        file: PathBuf,
        /// Object key (defaults to the file name)
        #[arg(long)]
        key: Option<String>,
    },
    /// Upload every file in a directory
    UploadDir { bucket: String, dir: PathBuf },
    /// Download every object of a bucket into a directory
    Download { bucket: String, dir: PathBuf },
    /// Download one object into a directory
    DownloadFile {
        bucket: String,
        dir: PathBuf,
        object: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/taxi_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("taxi_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = StorageSettings::from_env()?;

    match cli.command {
        Commands::Run {
            output,
            input,
            limit,
            num_shards,
            bucket,
            upload_dir,
            no_upload,
            pipeline_args,
        } => {
            if !pipeline_args.is_empty() {
                debug!(?pipeline_args, "Ignoring pass-through pipeline options");
            }

            let source = CsvTripSource::new(input).with_limit(limit);
            let options = PipelineOptions::new(&output).with_num_shards(num_shards);
            let summary = run_pipeline(&source, &options)?;
            log_json(&summary)?;

            if no_upload {
                info!("Upload disabled, leaving files local");
                return Ok(());
            }

            let bucket = bucket.unwrap_or(settings.bucket.clone());
            let sync = BucketSync::new(s3_store(&settings).await);
            // Without an explicit directory only this run's shards are sent.
            let report = match upload_dir.or(settings.upload_dir.clone()) {
                Some(dir) => sync.upload_directory(&bucket, &dir).await?,
                None => sync.upload_files(&bucket, &summary.files).await?,
            };
            if !report.is_complete() {
                warn!(
                    uploaded = report.count(),
                    failed = report.failed.len(),
                    "Upload finished with problems"
                );
            }
            log_json(&report)?;
        }
        Commands::Bucket { command } => {
            let sync = BucketSync::new(s3_store(&settings).await);
            bucket_command(&sync, command).await?;
        }
    }

    Ok(())
}

async fn bucket_command(sync: &BucketSync<S3BucketStore>, command: BucketCommand) -> Result<()> {
    match command {
        BucketCommand::List => {
            let buckets = sync.list_buckets().await?;
            info!(total = buckets.len(), "Bucket list fetched");
        }
        BucketCommand::Counts => log_json(&sync.list_bucket_counts().await?)?,
        BucketCommand::Details { bucket } => match sync.bucket_details(&bucket).await? {
            Some(objects) => info!(bucket = %bucket, objects, "Bucket has objects"),
            None => warn!(bucket = %bucket, "Bucket not found"),
        },
        BucketCommand::Exists { bucket } => {
            let exists = sync.bucket_exists(&bucket).await?;
            info!(bucket = %bucket, exists, "Bucket existence checked");
        }
        BucketCommand::Create { bucket } => {
            if !sync.create_bucket(&bucket).await? {
                anyhow::bail!("bucket '{bucket}' could not be created");
            }
        }
        BucketCommand::Delete { bucket } => log_json(&sync.delete_bucket(&bucket).await?)?,
        BucketCommand::UploadFile { bucket, file, key } => {
            log_json(&sync.upload_file(&bucket, &file, key.as_deref()).await?)?
        }
        BucketCommand::UploadDir { bucket, dir } => {
            log_json(&sync.upload_directory(&bucket, &dir).await?)?
        }
        BucketCommand::Download { bucket, dir } => {
            log_json(&sync.download_bucket(&bucket, &dir).await?)?
        }
        BucketCommand::DownloadFile {
            bucket,
            dir,
            object,
        } => log_json(&sync.download_object(&bucket, &dir, &object).await?)?,
    }
    Ok(())
}

/// Builds the single storage client used for the whole invocation.
async fn s3_store(settings: &StorageSettings) -> S3BucketStore {
    let config = aws_config::load_from_env().await;
    S3BucketStore::new(&config, settings.force_path_style)
}

/// Logs a serializable value as pretty-printed JSON.
fn log_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
