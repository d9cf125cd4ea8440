//! reviews-ingest - Review loader and analytics CLI
//!
//! Subcommands:
//! - `init`: create the review table (`--reset` drops it first)
//! - `load`: deduplicating batch load of an NDJSON file (or `-` for stdin)
//! - `report`: run the read-side aggregations, optionally rendering charts

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reviews_common::config::{load_toml_config, Backend, MalformedPolicy, Overrides, Settings};
use reviews_common::REVIEWS_TABLE;
use reviews_ingest::analytics::{charts, Report};
use reviews_ingest::{open_store, BatchLoader, JsonLineSource, LoadOptions};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for reviews-ingest
#[derive(Parser, Debug)]
#[command(name = "reviews-ingest")]
#[command(about = "Deduplicating review loader and analytics")]
#[command(version)]
struct Args {
    /// TOML config file (default: per-user config dir, or REVIEWS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store backend: sqlite or clickhouse
    #[arg(long, global = true, env = "REVIEWS_BACKEND")]
    backend: Option<Backend>,

    /// SQLite database file
    #[arg(long, global = true, env = "REVIEWS_DATABASE")]
    database: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the review table if missing
    Init {
        /// Drop and recreate the table
        #[arg(long)]
        reset: bool,
    },
    /// Load an NDJSON review file, skipping reviews already stored
    Load {
        /// Input file, or `-` for stdin
        input: PathBuf,

        /// Records per flush
        #[arg(long)]
        batch_size: Option<usize>,

        /// What to do with a malformed line: abort or skip
        #[arg(long)]
        on_malformed: Option<MalformedPolicy>,

        /// Retries per store call before a batch is dropped
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Print review analytics
    Report {
        /// Write SVG charts into this directory
        #[arg(long)]
        charts: Option<PathBuf>,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            backend: self.backend,
            database: self.database.clone(),
            log_level: self.log_level.clone(),
            ..Overrides::default()
        };
        if let Command::Load {
            batch_size,
            on_malformed,
            max_retries,
            ..
        } = &self.command
        {
            overrides.batch_size = *batch_size;
            overrides.on_malformed = *on_malformed;
            overrides.max_retries = *max_retries;
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    let settings =
        Settings::resolve(&args.overrides(), &toml).context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting reviews-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let store = open_store(&settings)
        .await
        .context("Failed to connect to review store")?;
    info!("Connected to {:?} store", settings.backend);

    match args.command {
        Command::Init { reset } => {
            if reset {
                store
                    .reset_schema(REVIEWS_TABLE)
                    .await
                    .context("Failed to reset review table")?;
                info!("Review table dropped and recreated");
            } else {
                store
                    .ensure_schema(REVIEWS_TABLE)
                    .await
                    .context("Failed to create review table")?;
                info!("Review table ready");
            }
        }
        Command::Load { input, .. } => {
            store
                .ensure_schema(REVIEWS_TABLE)
                .await
                .context("Failed to create review table")?;

            let source = JsonLineSource::open(&input)
                .with_context(|| format!("Failed to open input {}", input.display()))?;
            let loader = BatchLoader::new(store.as_ref(), LoadOptions::from_settings(&settings))?;
            let stats = loader
                .run(source)
                .await
                .with_context(|| format!("Load of {} stopped", input.display()))?;

            info!("Load summary: {}", stats);
            for flush in stats.flushes.iter().filter(|f| f.is_failed()) {
                warn!(
                    "Lines {}-{} were not stored ({} rows)",
                    flush.first_line, flush.last_line, flush.size
                );
            }
            if stats.failed_batches > 0 {
                warn!(
                    "{} batch(es) were not stored; re-run the load to retry them",
                    stats.failed_batches
                );
            }
        }
        Command::Report { charts: chart_dir } => {
            let report = Report::collect(store.as_ref(), REVIEWS_TABLE)
                .await
                .context("Failed to run analytics queries")?;
            println!("{}", report);

            if let Some(dir) = chart_dir {
                let written = charts::render_report(&report, &dir)
                    .with_context(|| format!("Failed to render charts into {}", dir.display()))?;
                info!("{} chart(s) written to {}", written.len(), dir.display());
            }
        }
    }

    Ok(())
}
