//! # coderag CLI
//!
//! Ingests a local repository snapshot into a per-repository namespace of the
//! vector index and prints retrieval context for questions about it.
//!
//! ```bash
//! coderag ingest --repo https://github.com/o/r ./r
//! coderag context --repo https://github.com/o/r "where is auth handled?"
//! coderag status --repo https://github.com/o/r
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coderag_core::{AppBuilder, resolve_config_path};
use coderag_index::IngestReport;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "coderag",
    about = "Function-level code retrieval for repository Q&A",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Falls back to `CODERAG_CONFIG`,
    /// then `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, embed and index every supported file under a directory.
    Ingest {
        /// Repository identifier; selects the namespace.
        #[arg(long)]
        repo: String,

        /// Local snapshot of the repository.
        path: PathBuf,

        /// Take over a namespace left mid-ingestion by an interrupted run.
        #[arg(long)]
        force: bool,

        /// Drop the namespace's vectors and manifest first, e.g. to switch
        /// embedding models.
        #[arg(long)]
        reset: bool,
    },

    /// Print the augmented prompt for a question.
    Context {
        #[arg(long)]
        repo: String,

        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the assistant system prompt before the context.
        #[arg(long)]
        system_prompt: bool,
    },

    /// Print the ingestion state of a repository.
    Status {
        #[arg(long)]
        repo: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let app = AppBuilder::from_path(config_path).await?;
    let pipeline = app.build().await?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        trigger.cancel();
    });

    match cli.command {
        Command::Ingest {
            repo,
            path,
            force,
            reset,
        } => {
            let namespace = pipeline.namespace(&repo)?;
            let root = path
                .canonicalize()
                .with_context(|| format!("cannot access {}", path.display()))?;
            pipeline.verify_credentials().await?;
            let report = if reset {
                pipeline
                    .indexer
                    .rebuild_directory(&namespace, &root, force, &cancel)
                    .await?
            } else {
                pipeline
                    .indexer
                    .index_directory(&namespace, &root, force, &cancel)
                    .await?
            };
            print_report(&report);
        }
        Command::Context {
            repo,
            question,
            system_prompt,
        } => {
            let namespace = pipeline.namespace(&repo)?;
            pipeline.verify_credentials().await?;
            let query = question.join(" ");
            let context = pipeline
                .assembler
                .assemble(&namespace, &query, &cancel)
                .await?;
            if context.is_empty() {
                eprintln!("no indexed code matched in {namespace}; is the repository ingested?");
            }
            if system_prompt {
                println!("{}", coderag_index::assembler::system_prompt());
            }
            println!("{}", context.text);
        }
        Command::Status { repo } => {
            let namespace = pipeline.namespace(&repo)?;
            let state = pipeline.store.state(&namespace).await?;
            let units = pipeline.store.unit_count(&namespace).await?;
            println!("{namespace}: {state} ({units} units)");
        }
    }

    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "{}: {} files scanned, {} indexed; {} units extracted, {} embedded, {} unchanged, {} removed ({} ms)",
        report.state,
        report.files_scanned,
        report.files_indexed,
        report.units_extracted,
        report.units_embedded,
        report.units_unchanged,
        report.units_removed,
        report.duration_ms,
    );
    for failure in &report.failures {
        match failure.span {
            Some((start, end)) => eprintln!(
                "  {:?} {}[{start}..{end}]: {}",
                failure.kind, failure.file_path, failure.message
            ),
            None => eprintln!(
                "  {:?} {}: {}",
                failure.kind, failure.file_path, failure.message
            ),
        }
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
