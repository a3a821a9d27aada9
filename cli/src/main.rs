//! caseload CLI: load a case dataset, enrich region codes, publish in batches.
//!
//! Usage:
//! ```bash
//! # Publish to a local cluster with 10 workers, 50 records per batch
//! caseload run --input us.data
//!
//! # Same, but from a TOML config with flag overrides
//! caseload run --config caseload.toml --workers 5 --strict
//!
//! # Validate and enrich the dataset without touching a backend
//! caseload check --input us.data
//! ```

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use caseload_core::{load_dataset, Backend, MemoryBackend, Pipeline, PipelineConfig};
use caseload_http::{HttpBackend, HttpBackendConfig};

#[derive(Parser, Debug)]
#[command(name = "caseload")]
#[command(about = "Load, enrich and publish geotagged case records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, enrich and publish records to the backend
    Run {
        #[command(flatten)]
        opts: Overrides,

        /// Publish into an in-memory backend instead of the endpoint
        #[arg(long)]
        dry_run: bool,

        /// Exit with an error if any record failed to index
        #[arg(long)]
        strict: bool,
    },
    /// Load and enrich the dataset only, then print counts
    Check {
        #[command(flatten)]
        opts: Overrides,
    },
}

impl Command {
    fn opts(&self) -> &Overrides {
        match self {
            Self::Run { opts, .. } | Self::Check { opts } => opts,
        }
    }
}

/// Settings applied on top of the config file (and defaults).
#[derive(Args, Debug, Default)]
struct Overrides {
    /// TOML config file
    #[arg(short, long, env = "CASELOAD_CONFIG")]
    config: Option<PathBuf>,

    /// JSON dataset to load
    #[arg(short, long, env = "CASELOAD_INPUT")]
    input: Option<PathBuf>,

    /// Keep at most this many records
    #[arg(long, env = "CASELOAD_LIMIT")]
    limit: Option<usize>,

    /// Number of upload workers
    #[arg(short, long, env = "CASELOAD_WORKERS")]
    workers: Option<usize>,

    /// Records per batch
    #[arg(short, long, env = "CASELOAD_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Pending batches the queue may hold
    #[arg(long, env = "CASELOAD_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Backend base URL
    #[arg(short, long, env = "CASELOAD_ENDPOINT")]
    endpoint: Option<String>,

    /// Target index
    #[arg(long, env = "CASELOAD_INDEX")]
    index: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "CASELOAD_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Deadline for one record across all retries, in milliseconds
    /// (default: the HTTP client's full retry budget)
    #[arg(long, env = "CASELOAD_RECORD_DEADLINE_MS")]
    record_deadline_ms: Option<u64>,

    /// Extra region table (JSON: {"CC": {"name": "code"}})
    #[arg(long, env = "CASELOAD_REGIONS")]
    regions: Option<PathBuf>,

    /// Do not ask the backend to refresh after each document
    #[arg(long)]
    no_refresh: bool,

    /// Global log level
    #[arg(long, env = "CASELOAD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    log_json: bool,
}

impl Overrides {
    /// Defaults, then the config file, then flags / environment.
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                PipelineConfig::from_toml(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if let Some(v) = &self.input {
            cfg.input = v.clone();
        }
        if let Some(v) = self.limit {
            cfg.limit = v;
        }
        if let Some(v) = self.workers {
            cfg.workers = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.queue_capacity {
            cfg.queue_capacity = Some(v);
        }
        if let Some(v) = &self.endpoint {
            cfg.endpoint = v.clone();
        }
        if let Some(v) = &self.index {
            cfg.index = v.clone();
        }
        if let Some(v) = self.request_timeout_ms {
            cfg.request_timeout_ms = v;
        }
        if let Some(v) = self.record_deadline_ms {
            cfg.record_deadline_ms = Some(v);
        }
        if let Some(v) = &self.regions {
            cfg.regions_file = Some(v.clone());
        }
        if self.no_refresh {
            cfg.refresh = false;
        }
        if let Some(v) = &self.log_level {
            cfg.log.level = v.clone();
        }
        if self.log_json {
            cfg.log.json = true;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.command.opts().resolve()?;
    logging::init_tracing(&config.log);

    match cli.command {
        Command::Run { dry_run, strict, .. } => cmd_run(config, dry_run, strict).await,
        Command::Check { .. } => cmd_check(config).await,
    }
}

async fn load(config: &PipelineConfig) -> Result<Vec<caseload_core::NormalizedRecord>> {
    let cfg = config.clone();
    let records = tokio::task::spawn_blocking(move || load_dataset(&cfg))
        .await
        .context("loader task failed")?
        .with_context(|| format!("could not load {}", config.input.display()))?;
    Ok(records)
}

async fn cmd_check(config: PipelineConfig) -> Result<()> {
    let records = load(&config).await?;
    let batches = caseload_core::expected_batches(records.len(), config.batch_size);
    println!("records: {}", records.len());
    println!("batches: {batches} (batch size {})", config.batch_size);
    Ok(())
}

async fn cmd_run(mut config: PipelineConfig, dry_run: bool, strict: bool) -> Result<()> {
    let records = load(&config).await?;

    let backend: Arc<dyn Backend> = if dry_run {
        info!("dry run: publishing to in-memory backend");
        Arc::new(MemoryBackend::new())
    } else {
        let http = HttpBackend::new(
            config.endpoint.clone(),
            HttpBackendConfig {
                request_timeout: config.request_timeout(),
                refresh: config.refresh,
                ..Default::default()
            },
        )
        .context("could not create backend client")?;
        if config.record_deadline_ms.is_none() {
            config.record_deadline_ms = Some(http.record_deadline().as_millis() as u64);
        }
        Arc::new(http)
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, cancelling");
            on_signal.cancel();
        }
    });

    let report = Pipeline::new(config, backend)
        .run(records, cancel)
        .await
        .context("pipeline failed")?;

    println!(
        "indexed {} of {} records in {} batches ({} workers, {:.2?})",
        report.succeeded, report.records, report.batches, report.workers, report.elapsed
    );
    if !report.is_complete() {
        warn!(failed = report.failed, "some records were not indexed");
    }
    if strict {
        report.ensure_complete()?;
    }
    Ok(())
}
