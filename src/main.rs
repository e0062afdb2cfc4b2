use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use parcel_intel::config::AppConfig;
use parcel_intel::email::{MailProvider, NormalizedEmail};
use parcel_intel::llm::{LlmConfig, LlmProvider, create_provider};
use parcel_intel::pipeline::{BatchEnricher, HybridParser};
use parcel_intel::secondary::build_secondary;
use parcel_intel::store::{LibSqlBackend, ParcelStore};
use parcel_intel::sync::{DirectoryFetcher, Mailbox, SyncOrchestrator, spawn_sync_loop};

#[derive(Parser)]
#[command(version, about = "Parcel tracking from shipping emails", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse .eml files and print the extraction results as JSON
    Parse { files: Vec<PathBuf> },

    /// Sync a directory of .eml files into the parcel database
    Import {
        owner: String,
        dir: PathBuf,
        /// Messages to fetch; defaults to the configured sync volume
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List the stored parcels of an owner
    Parcels { owner: String },

    /// Re-sync a directory of .eml files for an owner until interrupted
    Watch { owner: String, dir: PathBuf },
}

/// Install the stderr subscriber, plus a daily-rolling file sink when
/// `PARCEL_INTEL_LOG_DIR` is set. The returned guard flushes the file sink.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(stderr);

    match std::env::var("PARCEL_INTEL_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "parcel-intel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            registry.init();
            None
        }
    }
}

/// The generative backend, when `LLM_API_KEY` is set.
fn build_llm() -> anyhow::Result<Option<Arc<dyn LlmProvider>>> {
    match LlmConfig::from_env()? {
        Some(llm_config) => Ok(Some(create_provider(&llm_config)?)),
        None => Ok(None),
    }
}

fn build_parser(
    config: &AppConfig,
    llm: Option<Arc<dyn LlmProvider>>,
) -> anyhow::Result<HybridParser> {
    let parser = HybridParser::new(config.pipeline.clone());
    let secondary = build_secondary(&config.secondary, &config.enrichment, llm)
        .context("Failed to create secondary extractor")?;
    Ok(match secondary {
        Some(secondary) => parser.with_secondary(secondary, config.secondary.timeout),
        None => parser,
    })
}

async fn build_orchestrator(config: &AppConfig, dir: &Path) -> anyhow::Result<SyncOrchestrator> {
    let store: Arc<dyn ParcelStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let fetcher = Arc::new(DirectoryFetcher::new(dir));
    let llm = build_llm()?;
    let parser = build_parser(config, llm.clone())?;
    let mut orchestrator = SyncOrchestrator::new(store, fetcher, parser, config.sync.clone());

    if let Some(llm) = llm.filter(|_| config.enrichment.enabled) {
        orchestrator =
            orchestrator.with_enricher(BatchEnricher::new(llm, config.enrichment.clone()));
    }
    Ok(orchestrator)
}

/// Register the directory as a file mailbox of `owner`, keeping its state
/// when it already exists.
async fn ensure_mailbox(
    store: &Arc<dyn ParcelStore>,
    owner: &str,
    dir: &Path,
) -> anyhow::Result<String> {
    let id = format!("file:{owner}:{}", dir.display());
    if store.get_mailbox(&id).await?.is_none() {
        let mailbox = Mailbox::new(id.clone(), owner, MailProvider::File, dir.display().to_string());
        store.upsert_mailbox(&mailbox).await?;
    }
    Ok(id)
}

async fn run_parse(config: &AppConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let parser = build_parser(config, build_llm()?)?;
    for path in files {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let email = NormalizedEmail::from_rfc822(&raw)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        let result = parser.parse(&email).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

async fn run_import(
    config: &AppConfig,
    owner: &str,
    dir: &Path,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config, dir).await?;
    let mailbox_id = ensure_mailbox(orchestrator.store(), owner, dir).await?;
    let summary = orchestrator.sync_mailbox(owner, &mailbox_id, limit).await?;
    println!(
        "fetched {}  duplicates {}  parsed {}  tracking found {}  no tracking {}",
        summary.fetched,
        summary.duplicates,
        summary.parsed,
        summary.tracking_found,
        summary.no_tracking
    );
    Ok(())
}

async fn run_parcels(config: &AppConfig, owner: &str) -> anyhow::Result<()> {
    let store = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let parcels = store.list_parcels(owner).await?;
    if parcels.is_empty() {
        eprintln!("No parcels for {owner}");
    }
    for parcel in parcels {
        println!(
            "{:<24} {:<18} {:<16} {}",
            parcel.tracking_number,
            parcel.carrier.display_name(),
            parcel.status.as_str(),
            parcel.title
        );
    }
    Ok(())
}

async fn run_watch(config: &AppConfig, owner: &str, dir: &Path) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config, dir).await?;
    ensure_mailbox(orchestrator.store(), owner, dir).await?;

    let (handle, shutdown) = spawn_sync_loop(
        Arc::new(orchestrator),
        vec![owner.to_string()],
        config.sync.interval,
    );
    eprintln!(
        "Watching {} every {}s. Ctrl-C to stop.",
        dir.display(),
        config.sync.interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let _log_guard = init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command {
        Command::Parse { files } => run_parse(&config, &files).await,
        Command::Import { owner, dir, limit } => run_import(&config, &owner, &dir, limit).await,
        Command::Parcels { owner } => run_parcels(&config, &owner).await,
        Command::Watch { owner, dir } => run_watch(&config, &owner, &dir).await,
    }
}
