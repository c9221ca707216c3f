use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use guardian_search::config::Config;
use guardian_search::db::{BackendKind, Storage};
use guardian_search::embedder::{Embedder, load_embedder};
use guardian_search::indexer::{FileContentExtractor, IndexPipeline, PipelineOptions};
use guardian_search::query::{QueryEngine, SearchKind};

#[derive(Parser)]
#[command(name = "guardian", version, about = "Local semantic search over files and folders")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every file under ROOT
    Index {
        root: PathBuf,

        /// Reprocess files that are already indexed
        #[arg(long)]
        no_resume: bool,

        /// Files embedded per batch (overrides the config)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Search the index
    Search {
        query: String,

        /// Results per group (overrides the config)
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, value_enum, default_value_t = SearchKind::Both)]
        kind: SearchKind,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Index {
            root,
            no_resume,
            batch_size,
        } => {
            if !root.is_dir() {
                bail!("Folder not found: {}", root.display());
            }
            let config = load_config(&cli.config)?;
            let batch_size = batch_size.unwrap_or(config.batch_size);
            let (embedder, storage) = open(&config).await?;

            let options = PipelineOptions::from_config(&config)?;
            let pipeline = IndexPipeline::new(
                &storage,
                embedder.as_ref(),
                Arc::new(FileContentExtractor),
                options,
            );
            let report = pipeline.index_folder(&root, batch_size, !no_resume).await?;

            println!("Files found:        {}", report.discovered);
            println!("Already indexed:    {}", report.already_indexed);
            println!("Content indexed:    {}", report.content_committed);
            if report.content_rescued > 0 {
                println!("Saved to fallback:  {}", report.content_rescued);
            }
            println!("Without text:       {}", report.empty + report.failed);
            println!("Dropped:            {}", report.content_dropped + report.labels_dropped);
            println!("File names indexed: {}", report.names_committed);
            println!("Folders indexed:    {}", report.folders_committed);
        }
        Command::Search {
            query,
            top_k,
            kind,
            json,
        } => {
            let config = load_config(&cli.config)?;
            let top_k = top_k.unwrap_or(config.search_top_k);
            let (embedder, storage) = open(&config).await?;
            if storage.kind() == BackendKind::Relational {
                warn!("Vector store unavailable; search results will be empty");
            }

            let engine = QueryEngine::new(&storage, embedder.as_ref(), &config.snippet);
            let groups = engine.search(&query, top_k, kind);

            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
                return Ok(());
            }
            for (group, results) in &groups {
                println!("== {} ==", group.label());
                if results.is_empty() {
                    println!("  (no results)");
                }
                for result in results {
                    println!("  {:.4}  {}", result.score, result.path);
                    if let Some(snippet) = &result.snippet {
                        println!("          {snippet}");
                    }
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    let config = Config::load(path).context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

/// Build the embedder and storage once for the lifetime of the command.
async fn open(config: &Config) -> Result<(Arc<dyn Embedder>, Storage)> {
    let cfg = config.clone();
    let embedder = tokio::task::spawn_blocking(move || load_embedder(&cfg))
        .await
        .context("Embedder loader panicked")??;

    let storage = Storage::open(
        Path::new(&config.vector_store_path),
        Path::new(&config.fallback_db_path),
        embedder.dimensions(),
    )
    .context("Failed to open storage")?;
    info!("Storage backend: {}", storage.kind().label());
    Ok((embedder, storage))
}
