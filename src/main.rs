//! # O-RAN / Nephio RAG CLI (`nrag`)
//!
//! ## Usage
//!
//! ```bash
//! nrag --config ./config/nrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nrag sources` | List configured documentation sources |
//! | `nrag build` | Fetch every enabled source and rebuild the vector database |
//! | `nrag update` | Re-index only pages whose content changed |
//! | `nrag status` | Show state, counts, and per-source breakdown |
//! | `nrag query "<question>"` | Answer one question |
//! | `nrag batch "<q1>" "<q2>" ...` | Answer several questions concurrently |
//! | `nrag serve` | Start the HTTP query surface |
//!
//! Logs go to stderr (filter with `RUST_LOG`); command output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oran_nephio_rag::config::{self, Config};
use oran_nephio_rag::error::RagError;
use oran_nephio_rag::models::{BuildReport, QueryResult};
use oran_nephio_rag::rag::RagSystem;
use oran_nephio_rag::{server, sources, stats};

/// O-RAN / Nephio documentation assistant: build a vector index of the
/// official docs and answer questions from it.
#[derive(Parser)]
#[command(name = "nrag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nrag.toml")]
    config: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured documentation sources.
    Sources,

    /// Rebuild the vector database from every enabled source.
    ///
    /// Clears the store first. Pages that fail to download or are too short
    /// are reported and skipped.
    Build,

    /// Re-index pages whose content hash changed since the last build.
    Update,

    /// Show system state and index statistics.
    Status,

    /// Answer a question.
    ///
    /// Loads the existing database, building it first if none exists.
    Query {
        /// The question to answer.
        question: String,
    },

    /// Answer several questions concurrently.
    Batch {
        /// Questions to answer, in order.
        #[arg(required = true)]
        questions: Vec<String>,
    },

    /// Start the HTTP query surface on `[server] bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sources => {
            sources::list_sources(&cfg);
        }
        Commands::Build => {
            let rag = RagSystem::new(cfg).await?;
            let report = rag.build_vector_database().await?;
            print_report(&report, cli.json)?;
            if !report.success {
                anyhow::bail!("build indexed no documents");
            }
        }
        Commands::Update => {
            let rag = RagSystem::new(cfg).await?;
            let report = rag.update_database().await?;
            print_report(&report, cli.json)?;
        }
        Commands::Status => {
            let rag = RagSystem::new(cfg.clone()).await?;
            match rag.load_existing_database().await {
                Ok(()) | Err(RagError::StoreNotReady(_)) => {}
                Err(e) => return Err(e.into()),
            }
            let status = rag.status().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                stats::print_status(&cfg, &status);
            }
        }
        Commands::Query { question } => {
            let rag = ready_system(cfg).await?;
            let result = rag.query(&question).await?;
            print_results(&[result], cli.json)?;
        }
        Commands::Batch { questions } => {
            let rag = ready_system(cfg).await?;
            let results = rag.batch_query(&questions).await?;
            print_results(&results, cli.json)?;
        }
        Commands::Serve => {
            let bind = cfg.server.bind.clone();
            let rag = ready_system(cfg).await?;
            server::run_server(Arc::new(rag), &bind).await?;
        }
    }

    Ok(())
}

/// Load the persisted database (building it if absent) and set up the QA chain.
async fn ready_system(cfg: Config) -> anyhow::Result<RagSystem> {
    let rag = RagSystem::new(cfg).await?;
    match rag.load_existing_database().await {
        Ok(()) => {}
        Err(RagError::StoreNotReady(_)) => {
            info!("no existing vector database, building one");
            let report = rag.build_vector_database().await?;
            if !report.success {
                anyhow::bail!(
                    "could not build the vector database: all {} page(s) failed",
                    report.failed.len()
                );
            }
        }
        Err(e) => return Err(e.into()),
    }
    rag.setup_qa_chain().await?;
    Ok(rag)
}

fn print_report(report: &BuildReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "Indexed {} document(s), {} chunk(s); {} unchanged; {} removed; {} failed ({:.1}s)",
        report.documents_indexed,
        report.chunks_indexed,
        report.documents_unchanged,
        report.documents_removed,
        report.failed.len(),
        report.elapsed_secs
    );
    for f in &report.failed {
        println!("  ✗ [{}] {}: {}", f.source, f.url, f.reason);
    }
    Ok(())
}

fn print_results(results: &[QueryResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        if results.len() > 1 {
            println!("Q{}: {}", i + 1, result.question);
        }
        println!("{}", result.answer);
        if !result.sources.is_empty() {
            println!();
            println!("Sources:");
            for (n, source) in result.sources.iter().enumerate() {
                println!("  [{}] {} - {}", n + 1, source.title, source.url);
            }
        }
        println!("({:.2}s)", result.query_time);
        if i + 1 < results.len() {
            println!();
        }
    }
    Ok(())
}
