//! `skillex-worker`: runs extraction workers against the PostgreSQL backlog.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillex_core::defaults::DATABASE_URL;
use skillex_core::{
    BacklogStore, EmbeddingBackend, EntityRecognizer, ExtractionConfig, ExtractionMode,
    TaxonomyStore, WorkerConfig,
};
use skillex_db::{log_pool_metrics, Database, PoolConfig};
use skillex_inference::{GlinerRecognizer, OllamaEmbedder};
use skillex_jobs::{start_workers, ExtractionPipeline, ExtractionWorker, Reaper};
use skillex_match::TaxonomySnapshot;

#[derive(Parser)]
#[command(name = "skillex-worker", version, about = "Skill extraction backlog worker")]
struct Cli {
    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = DATABASE_URL, global = true)]
    database_url: String,

    /// Override the extraction mode (cascade, ngram, hybrid).
    #[arg(long, global = true)]
    mode: Option<ExtractionMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run workers and the reaper until Ctrl-C.
    Run,
    /// Claim and process one batch, then print its summary.
    Once {
        /// Partition to claim from (defaults to SKILLEX_WORKER_ID or 0).
        #[arg(long)]
        worker_id: Option<usize>,
    },
    /// Reset claims stuck in processing back to pending.
    ResetStale {
        /// Age in seconds after which a claim is stale (defaults to SKILLEX_STALE_TIMEOUT_SECS).
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Requeue failed documents that have attempts left.
    RequeueFailed {
        /// Attempt cap (defaults to SKILLEX_MAX_ATTEMPTS).
        #[arg(long)]
        max_attempts: Option<i32>,
    },
    /// Print backlog counts by status.
    Stats,
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: skillex crates at info)
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "skillex_jobs=info,skillex_db=info,skillex_match=info,skillex_extract=info,skillex_inference=info,skillex_worker=info"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("skillex-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Load the taxonomy snapshot and wire the configured model backends.
async fn build_pipeline(
    db: &Database,
    extraction: &ExtractionConfig,
) -> anyhow::Result<Arc<ExtractionPipeline>> {
    let snapshot = TaxonomySnapshot::load(db.taxonomy.as_ref())
        .await
        .context("loading taxonomy")?;
    info!(entry_count = snapshot.len(), "Taxonomy snapshot loaded");
    let taxonomy: Arc<dyn TaxonomyStore> = Arc::new(snapshot);

    let embedder: Option<Arc<dyn EmbeddingBackend>> = if extraction.semantic_enabled {
        Some(Arc::new(OllamaEmbedder::from_env()))
    } else {
        None
    };

    let recognizer: Option<Arc<dyn EntityRecognizer>> = match GlinerRecognizer::from_env() {
        Some(gliner) => {
            if !gliner.health_check().await {
                warn!("GLiNER sidecar is not healthy; entity extraction may fail documents");
            }
            Some(Arc::new(gliner))
        }
        None => {
            warn!(fallback = true, "GLINER_BASE_URL not set; entity extraction disabled");
            None
        }
    };

    let pipeline = ExtractionPipeline::build(taxonomy, extraction, embedder, recognizer)
        .await
        .context("building extraction pipeline")?;
    Ok(Arc::new(pipeline))
}

async fn run(db: &Database, extraction: &ExtractionConfig, config: &WorkerConfig) -> anyhow::Result<()> {
    let pipeline = build_pipeline(db, extraction).await?;
    let backlog: Arc<dyn BacklogStore> = db.backlog.clone();

    let workers = start_workers(backlog.clone(), pipeline, config);
    let reaper = Reaper::new(backlog, config).start();
    info!(
        workers = workers.len(),
        worker_count = config.worker_count,
        "Workers running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    for handle in &workers {
        if let Err(e) = handle.shutdown().await {
            warn!(worker_id = handle.worker_id(), error = %e, "Worker already stopped");
        }
    }
    for handle in workers {
        handle.join().await?;
    }
    reaper.shutdown().await?;
    log_pool_metrics(db.pool());
    info!("All workers stopped");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let mut extraction = ExtractionConfig::from_env()?;
    if let Some(mode) = cli.mode {
        extraction = extraction.with_mode(mode);
    }
    let config = WorkerConfig::from_env()?;
    config.validate()?;

    let db = Database::connect_with_config(
        &cli.database_url,
        PoolConfig::for_workers(config.worker_ids().len()),
    )
    .await
    .context("connecting to database")?;

    match cli.command {
        Command::Run => run(&db, &extraction, &config).await?,
        Command::Once { worker_id } => {
            let worker_id = worker_id.or(config.worker_id).unwrap_or(0);
            let pipeline = build_pipeline(&db, &extraction).await?;
            let worker = ExtractionWorker::new(worker_id, db.backlog.clone(), pipeline, config);
            let summary = worker.run_batch().await?;
            print_json(&summary)?;
        }
        Command::ResetStale { timeout_secs } => {
            let secs = timeout_secs.unwrap_or(config.stale_timeout_secs);
            let reset = db.backlog.reset_stale(Duration::from_secs(secs)).await?;
            print_json(&serde_json::json!({ "reset": reset, "timeout_secs": secs }))?;
        }
        Command::RequeueFailed { max_attempts } => {
            let cap = max_attempts.unwrap_or(config.max_attempts);
            let requeued = db.backlog.requeue_failed(cap).await?;
            print_json(&serde_json::json!({ "requeued": requeued, "max_attempts": cap }))?;
        }
        Command::Stats => print_json(&db.backlog.stats().await?)?,
    }
    Ok(())
}
