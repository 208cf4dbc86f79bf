use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reddit_sentiment_ingest::config::Config;
use reddit_sentiment_ingest::db::Database;
use reddit_sentiment_ingest::export::export_records;
use reddit_sentiment_ingest::pipeline::{PipelineController, RunOptions};
use reddit_sentiment_ingest::sentiment::LexiconScorer;

#[derive(Parser)]
#[command(
    name = "reddit-sentiment-ingest",
    version,
    about = "Incremental subreddit sentiment ingestion"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion pass over a subreddit's listing.
    Run {
        /// Subreddit to ingest (without the r/ prefix).
        #[arg(long)]
        subreddit: String,
        /// Maximum listing pages to walk (unbounded when omitted).
        #[arg(long)]
        max_pages: Option<u32>,
        /// Skip posts older than this bound (RFC 3339 or epoch seconds).
        #[arg(long)]
        since: Option<String>,
        /// Language tag recorded on ingested records (defaults to the subreddit name).
        #[arg(long)]
        language: Option<String>,
    },
    /// Export persisted records as a JSON array.
    Export {
        /// Restrict the export to one subreddit.
        #[arg(long)]
        subreddit: Option<String>,
        /// Output file (stdout when omitted).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if let Some(parent) = config
        .database_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized");

    match cli.command {
        Command::Run {
            subreddit,
            max_pages,
            since,
            language,
        } => {
            let since = since
                .map(|s| parse_since(&s))
                .transpose()
                .context("Invalid --since value")?;
            let options = RunOptions {
                language: language.unwrap_or_else(|| subreddit.clone()),
                subreddit,
                max_pages: max_pages.unwrap_or(0),
                since,
            };

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                warn!("Stop signal received, finishing in-flight work");
                signal_token.cancel();
            });

            let scorer = Arc::new(LexiconScorer::new());
            let mut controller = PipelineController::new(config, db, scorer)
                .context("Failed to initialize pipeline")?;
            let summary = controller.run(&options, shutdown).await?;

            info!(
                persisted = summary.persisted,
                skipped_duplicate = summary.skipped_duplicate,
                failed = summary.failed,
                "Ingestion run finished"
            );
        }
        Command::Export { subreddit, out } => {
            let count = export_records(&db, subreddit.as_deref(), out.as_deref()).await?;
            info!(records = count, "Export finished");
        }
    }

    Ok(())
}

/// Parse an RFC 3339 timestamp or epoch seconds.
fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let secs: i64 = value
        .parse()
        .context("expected RFC 3339 or epoch seconds")?;
    DateTime::from_timestamp(secs, 0).context("epoch seconds out of range")
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reddit_sentiment_ingest=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
