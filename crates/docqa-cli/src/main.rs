//! DocQA CLI - Command-line interface
//!
//! Usage:
//!   docqa ingest <path>...
//!   docqa ask <question>
//!   docqa inspect

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_core::{AppConfig, StorageBackend};
use docqa_rag::{DocumentService, RestoreOutcome};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your documents")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables still override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add documents to the live index and persist it
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from the ingested documents
    Ask {
        /// Question to ask
        question: String,
    },
    /// Print live index statistics
    Inspect,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

/// Expand directories one level deep into their files
fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = std::fs::read_dir(path)
                .with_context(|| format!("reading directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect::<Vec<_>>();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

async fn ingest(service: &DocumentService, paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut failed = 0usize;
    for file in collect_files(paths)? {
        let bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let name = file.to_string_lossy();

        match service.upload(&name, bytes).await {
            Ok(receipt) => println!(
                "{}: {} pages, {} chunks (index size {})",
                receipt.document, receipt.page_count, receipt.chunk_count, receipt.index_size
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", file.display());
            }
        }
    }

    let size = service.persist().await?;
    println!("Persisted live index ({size} bytes)");

    if failed > 0 {
        anyhow::bail!("{failed} document(s) could not be ingested");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if matches!(config.storage.backend, StorageBackend::Memory) {
        tracing::warn!("Memory storage backend: the index will not outlive this command");
    }

    let service = DocumentService::from_config(&config)?;
    if let RestoreOutcome::Failed { reason } = service.restore().await {
        eprintln!("Starting from an empty index: {reason}");
    }

    match cli.command {
        Commands::Ingest { paths } => ingest(&service, &paths).await?,
        Commands::Ask { question } => {
            let answer = service.ask(&question).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  - {source}");
                }
            }
        }
        Commands::Inspect => {
            println!("{}", serde_json::to_string_pretty(&service.stats())?);
        }
    }

    Ok(())
}
