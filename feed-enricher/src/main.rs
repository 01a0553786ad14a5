use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use feed_enricher::enrichment::ChatCompletionsProvider;
use feed_enricher::{
    AppConfig, EnrichmentPipeline, EntryStore, FeedSource, Fetcher, MemoryStore,
    OrchestratorBuilder, PassOptions, PgEntryStore, RssFeedSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feed-enricher", version, about = "Incremental feed ingest and enrichment")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one pass, or repeat on an interval until interrupted
    Run {
        /// Seconds to wait between passes; runs once when omitted
        #[arg(long)]
        interval_secs: Option<u64>,

        #[arg(long)]
        skip_fetch: bool,

        #[arg(long)]
        skip_enrich: bool,

        /// Use an in-memory store instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },
    /// Apply database migrations
    Migrate,
    /// Print entry counts and per-stage backlogs
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feed_enricher=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Run {
            interval_secs,
            skip_fetch,
            skip_enrich,
            memory,
        } => {
            let options = PassOptions {
                skip_fetch,
                skip_enrich,
            };
            run(&config, options, interval_secs.map(Duration::from_secs), memory).await
        }
        Command::Migrate => {
            let store = connect_store(&config).await?;
            store.migrate().await.context("migration failed")?;
            Ok(())
        }
        Command::Stats => {
            let store = connect_store(&config).await?;
            let stats = store.stats().await.context("failed to read stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

async fn run(
    config: &AppConfig,
    options: PassOptions,
    interval: Option<Duration>,
    memory: bool,
) -> Result<()> {
    let store: Arc<dyn EntryStore> = if memory {
        warn!("Using in-memory store; nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let store = connect_store(config).await?;
        store.migrate().await.context("migration failed")?;
        Arc::new(store)
    };

    let pipeline = if options.skip_enrich {
        EnrichmentPipeline::new(config.enrichment.batch_sizes.clone())
    } else {
        let provider = ChatCompletionsProvider::from_config(&config.enrichment.provider)
            .context("failed to set up the enrichment provider")?;
        EnrichmentPipeline::from_config(&config.enrichment, Arc::new(provider))?
    };

    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let specs = config.source_specs().context("failed to read feed sources")?;
    if specs.is_empty() && !options.skip_fetch {
        warn!("No feed sources configured");
    }

    let mut builder = OrchestratorBuilder::new()
        .with_store(store)
        .with_pipeline(pipeline);
    for spec in specs {
        let source: Box<dyn FeedSource> = Box::new(RssFeedSource::new(spec, fetcher.clone()));
        builder = builder.add_source(source);
    }

    let is_running = Arc::new(RwLock::new(true));
    let orchestrator = builder.with_running_flag(is_running.clone()).build()?;

    let shutdown = Arc::new(Notify::new());
    {
        let is_running = is_running.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, finishing the current item");
                *is_running.write().await = false;
                shutdown.notify_one();
            }
        });
    }

    loop {
        let report = orchestrator.run_pass(options).await;
        info!("Pass report: {}", serde_json::to_string(&report)?);
        if !report.is_clean() {
            error!("Pass finished with store errors; progress so far is kept");
        }

        let Some(interval) = interval else {
            break;
        };
        if !orchestrator.is_running().await {
            break;
        }

        info!("Next pass in {:?}", interval);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => {}
        }
        if !orchestrator.is_running().await {
            break;
        }
    }

    info!("Feed enricher stopped");
    Ok(())
}

async fn connect_store(config: &AppConfig) -> Result<PgEntryStore> {
    let url = config
        .database
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("no database configured; set DATABASE_URL or database.url"))?;

    info!("Connecting to database: {}", redact_password(url));
    PgEntryStore::connect(url, config.database.max_connections)
        .await
        .with_context(|| format!("failed to connect to {}", redact_password(url)))
}

fn redact_password(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}
