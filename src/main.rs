//! # Acadex CLI
//!
//! Commands for index initialization, corpus ingestion, and retrieval.
//!
//! ## Usage
//!
//! ```bash
//! acadex --config ./config/acadex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `acadex init` | Create the SQLite index and run schema migrations |
//! | `acadex sync` | One-shot crawl and ingestion of all configured branches |
//! | `acadex watch` | Run sync on a fixed interval until Ctrl-C |
//! | `acadex query "<question>" --branch CSE --year 2` | Retrieve the closest chunks |
//! | `acadex stats` | Show stored chunk and manifest counts |
//!
//! Credentials: the Drive service-account key path comes from the config;
//! the vision fallback reads `GEMINI_API_KEY` from the environment.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use acadex::config::{load_config, Config};
use acadex::drive::DriveClient;
use acadex::extract::TextExtractor;
use acadex::index::VectorIndex;
use acadex::manifest::Manifest;
use acadex::models::SyncReport;
use acadex::sync::{print_report, SyncEngine};
use acadex::vision::GeminiVision;
use acadex::{db, embedding, migrate, vision};

/// Acadex — ingestion and retrieval for branch/year academic document trees.
#[derive(Parser)]
#[command(
    name = "acadex",
    about = "Academic document ingestion and retrieval engine",
    version,
    long_about = "Acadex crawls branch/year/category Drive folders shared with a service \
    account, extracts text from PDFs, Office documents, spreadsheets, slides, and images \
    (via a vision model for scanned material), and maintains a local vector index that \
    answers branch/year-scoped similarity queries."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/acadex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database schema. Idempotent.
    Init,

    /// Crawl all configured branches once and ingest new files.
    Sync,

    /// Run sync repeatedly on the configured interval until interrupted.
    Watch,

    /// Retrieve the chunks closest to a question within one branch/year.
    Query {
        /// The question to search for.
        question: String,

        /// Branch code (e.g. CSE, ECE).
        #[arg(long)]
        branch: String,

        /// Academic year, 1-4.
        #[arg(long)]
        year: u8,

        /// Number of results to return (defaults to retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show stored record and manifest counts.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acadex=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Sync => run_sync(&config).await,
        Commands::Watch => run_watch(&config).await,
        Commands::Query {
            question,
            branch,
            year,
            top_k,
        } => run_query(&config, &question, &branch, year, top_k).await,
        Commands::Stats => run_stats(&config).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.storage.db_path()).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.storage.db_path().display());
    Ok(())
}

fn build_embedder(config: &Config) -> Result<Arc<dyn embedding::Embedder>> {
    #[cfg(feature = "local-embeddings")]
    {
        Ok(Arc::new(embedding::LocalEmbedder::new(&config.embedding)?))
    }
    #[cfg(not(feature = "local-embeddings"))]
    {
        let _ = config;
        anyhow::bail!("this build has no embedding backend; enable the local-embeddings feature")
    }
}

fn build_vision(config: &Config) -> Arc<dyn vision::VisionModel> {
    match GeminiVision::new(config.extraction.vision_model.clone()) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            tracing::warn!(error = %e, "vision model unavailable; scanned documents will be skipped");
            Arc::new(NoVision)
        }
    }
}

/// Stand-in when no vision credentials are configured: every transcription
/// fails, so scanned and image-only files skip with a logged warning.
struct NoVision;

#[async_trait::async_trait]
impl vision::VisionModel for NoVision {
    async fn transcribe(&self, _mime: &str, _bytes: &[u8]) -> acadex::error::Result<String> {
        Err(acadex::error::Error::config(
            "GEMINI_API_KEY not set; vision transcription disabled",
        ))
    }
}

async fn build_engine(config: &Config) -> Result<Option<SyncEngine>> {
    let remote = match DriveClient::new(&config.drive.service_account_json) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "drive access unavailable, sync skipped");
            return Ok(None);
        }
    };

    let pool = db::connect(&config.storage.db_path()).await?;
    migrate::run_migrations(&pool).await?;

    let embedder = build_embedder(config)?;
    let vision = build_vision(config);

    Ok(Some(SyncEngine::new(
        remote,
        TextExtractor::new(vision, config.extraction.ocr_min_chars),
        VectorIndex::new(pool.clone(), embedder),
        Manifest::new(pool),
        config.drive.branches.clone(),
        config.chunking.clone(),
    )))
}

async fn run_sync(config: &Config) -> Result<()> {
    match build_engine(config).await? {
        Some(engine) => {
            let report = engine.sync().await;
            print_report(&report);
        }
        None => print_report(&SyncReport::skipped()),
    }
    Ok(())
}

async fn run_watch(config: &Config) -> Result<()> {
    let Some(engine) = build_engine(config).await? else {
        print_report(&SyncReport::skipped());
        return Ok(());
    };

    let interval = std::time::Duration::from_secs(config.sync.interval_minutes * 60);
    let periodic = Arc::new(engine).start_periodic(interval);

    println!(
        "watching; syncing every {} minutes (Ctrl-C to stop)",
        config.sync.interval_minutes
    );
    tokio::signal::ctrl_c().await?;
    println!("stopping after current iteration...");
    periodic.stop().await;
    Ok(())
}

async fn run_query(
    config: &Config,
    question: &str,
    branch: &str,
    year: u8,
    top_k: Option<usize>,
) -> Result<()> {
    if !(1..=4).contains(&year) {
        anyhow::bail!("year must be between 1 and 4");
    }

    let pool = db::connect(&config.storage.db_path()).await?;
    migrate::run_migrations(&pool).await?;
    let embedder = build_embedder(config)?;
    let index = VectorIndex::new(pool.clone(), embedder);

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let hits = index.query(question, branch, year, top_k).await;

    if hits.is_empty() {
        println!("No results.");
    } else {
        for (i, hit) in hits.iter().enumerate() {
            println!("{}. [{:.3}] {} ({})", i + 1, hit.distance, hit.filename, hit.category);
            if let Some(ref link) = hit.link {
                println!("    link: {}", link);
            }
            println!("    {}", hit.content.replace('\n', " "));
            println!();
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(&config.storage.db_path()).await?;
    migrate::run_migrations(&pool).await?;

    let embedder = build_embedder(config)?;
    let index = VectorIndex::new(pool.clone(), embedder);
    let manifest = Manifest::new(pool.clone());

    println!("chunks stored: {}", index.count().await?);
    println!("files ingested: {}", manifest.len().await?);
    println!("embedding model: {}", index.embedder().model_name());

    pool.close().await;
    Ok(())
}
