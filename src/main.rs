//! CLI entry point for the GTFS snapshot builder.
//!
//! `build` runs the pipeline once (meant for a scheduled trigger), `verify`
//! re-checks a published manifest against its artifact, and `list-indices`
//! prints the indices of a database artifact.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gtfs_snapshot::config::{PublishTarget, Settings};
use gtfs_snapshot::fetch::{HttpFeedSource, LocationSource};
use gtfs_snapshot::output::{RunRecord, append_record, print_json};
use gtfs_snapshot::package::{self, Manifest, Mismatch, Packager, sqlite};
use gtfs_snapshot::pipeline::{Outcome, Pipeline};
use gtfs_snapshot::publish::{DirectoryPublisher, Publisher, S3Publisher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_snapshot")]
#[command(about = "Builds indexed SQLite snapshots of a GTFS feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the feed, build the snapshot and publish it if it changed
    Build {
        /// Feed URL, or a local archive path for manual runs
        #[arg(long, value_name = "URL_OR_FILE")]
        feed_url: Option<String>,

        /// Directory the database, artifact and manifest are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// File name of the SQLite database
        #[arg(long)]
        db_name: Option<String>,

        /// Whole-request timeout for the feed download, in seconds
        #[arg(long)]
        fetch_timeout: Option<u64>,

        /// Local release directory, used when no S3 bucket is set
        #[arg(long)]
        publish_dir: Option<PathBuf>,

        /// S3 bucket to publish releases to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix inside the S3 bucket
        #[arg(long)]
        s3_prefix: Option<String>,

        /// CSV file to append a record of this run to
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Recompute a manifest's fingerprint from its artifact
    Verify {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
    /// List the indices of a SQLite snapshot
    ListIndices {
        #[arg(value_name = "DB")]
        database: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_snapshot.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_snapshot.log"));

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

    match cli.command {
        Commands::Build {
            feed_url,
            output_dir,
            db_name,
            fetch_timeout,
            publish_dir,
            s3_bucket,
            s3_prefix,
            history,
        } => {
            let mut settings = Settings::from_env()?;
            if let Some(url) = feed_url {
                settings.feed_url = url;
            }
            if let Some(dir) = output_dir {
                settings.output_dir = dir;
            }
            if let Some(name) = db_name {
                settings.db_name = name;
            }
            if let Some(secs) = fetch_timeout {
                settings.fetch_timeout = Duration::from_secs(secs);
            }
            if let Some(dir) = publish_dir {
                settings.publish_dir = dir;
            }
            if s3_bucket.is_some() {
                settings.s3_bucket = s3_bucket;
            }
            if let Some(prefix) = s3_prefix {
                settings.s3_prefix = prefix;
            }

            match settings.publish_target() {
                PublishTarget::Directory(root) => {
                    info!(root = %root.display(), "Publishing to local directory");
                    build(&settings, DirectoryPublisher::new(root), history.as_deref()).await?;
                }
                PublishTarget::S3 { bucket, prefix } => {
                    info!(bucket = %bucket, prefix = %prefix, "Publishing to S3");
                    let publisher = S3Publisher::from_env(bucket, prefix).await;
                    build(&settings, publisher, history.as_deref()).await?;
                }
            }
        }
        Commands::Verify { manifest } => {
            let verification = package::verify(&manifest)
                .with_context(|| format!("failed to verify {}", manifest.display()))?;
            print_json(&Manifest::read(&manifest)?)?;
            match verification.problem() {
                Some(Mismatch::Fingerprint) => bail!(
                    "fingerprint mismatch: manifest has {}, artifact hashes to {}",
                    verification.expected,
                    verification.actual
                ),
                Some(Mismatch::EntityCounts) => bail!(
                    "entity count mismatch: artifact rows differ from the manifest's entity_counts"
                ),
                None => {}
            }
            info!(fingerprint = %verification.actual, "Manifest matches artifact");
        }
        Commands::ListIndices { database } => {
            let names = sqlite::list_indices(&database)
                .with_context(|| format!("failed to read {}", database.display()))?;
            for name in &names {
                println!("{name}");
            }
            info!(count = names.len(), "Indices listed");
        }
    }

    Ok(())
}

/// Runs the pipeline once and records the run. Suppression is a success.
async fn build<P: Publisher>(
    settings: &Settings,
    publisher: P,
    history: Option<&Path>,
) -> Result<()> {
    let http = HttpFeedSource::with_timeout(settings.fetch_timeout)?;
    let pipeline = Pipeline::new(
        LocationSource::new(http),
        publisher,
        Packager::new(&settings.output_dir, &settings.db_name),
    );

    let result = pipeline.run(&settings.feed_url).await;

    if let Some(path) = history {
        append_record(path, &RunRecord::from_result(&result))
            .with_context(|| format!("failed to append run record to {}", path.display()))?;
    }

    match result? {
        Outcome::Published { manifest, tag } => {
            info!(tag = %tag, "Build published");
            print_json(&manifest)?;
        }
        Outcome::Suppressed { .. } => {}
    }
    Ok(())
}
