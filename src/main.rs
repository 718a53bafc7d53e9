//! Command-line entry point for the repository answering service.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use reporag_rs::config::EngineConfig;
use reporag_rs::engine::Engine;
use reporag_rs::{ingest, server};

/// Retrieval-augmented answering service for Git repositories.
#[derive(Parser, Debug)]
#[command(name = "reporag-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP service.
    ///
    /// Exposes `/index_repo`, `/progress`, `/chat`, and `/health`.
    #[command(after_help = r#"Examples:
  reporag-rs serve                      # Listen on $PORT (default 8000)
  PORT=9000 reporag-rs serve            # Custom port
"#)]
    Serve,

    /// Ingest a repository into the vector index (one-shot, foreground).
    #[command(after_help = r#"Examples:
  reporag-rs ingest https://github.com/acme/widgets
  reporag-rs ingest https://github.com/acme/widgets --revision v2.1.0
  reporag-rs ingest ./local-checkout --local      # No credentials needed
"#)]
    Ingest {
        /// Repository URL (or local path for file-protocol clones).
        url: String,

        /// Branch, tag, or commit to pin. Defaults to the branch tip.
        #[arg(short, long)]
        revision: Option<String>,

        /// Use the in-process store and hash embedder (validation runs).
        #[arg(long)]
        local: bool,
    },

    /// Ask a question against an indexed repository.
    #[command(after_help = r#"Examples:
  reporag-rs query "Where is authentication handled?"
  reporag-rs query "architecture overview" --repo github-com-acme-widgets
  reporag-rs --format json query "python tests" | jq '.sources'
"#)]
    Query {
        /// The question to answer.
        query: String,

        /// Repository id to scope the query (defaults to the most
        /// recently indexed).
        #[arg(short, long)]
        repo: Option<String>,

        /// Model override for this query.
        #[arg(long)]
        model: Option<String>,
    },

    /// List indexed repositories.
    #[command(alias = "repos")]
    #[command(after_help = r#"Examples:
  reporag-rs list                                 # Human-readable table
  reporag-rs --format json list | jq '.[].id'
"#)]
    List,

    /// Delete an indexed repository and its namespace.
    Delete {
        /// Repository URL or id.
        url: String,
    },
}

/// Writes CLI output through a locked stdout handle.
fn emit(text: &str) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("failed to write to stdout")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("reporag_rs={default_level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve => {
            let engine = Arc::new(Engine::from_config(EngineConfig::from_env()));
            server::serve(engine).await.context("server failed")?;
        }

        Commands::Ingest {
            url,
            revision,
            local,
        } => {
            let config = EngineConfig::from_env();
            let engine = if local {
                Engine::local(config)
            } else {
                Engine::from_config(config)
            };

            let report = ingest::run(
                engine.deps(),
                &url,
                revision.as_deref(),
                &|percent, stage| tracing::info!(percent, %stage, "progress"),
                &CancellationToken::new(),
            )
            .await
            .context("ingestion failed")?;

            if cli.format == "json" {
                emit(&format!("{}\n", serde_json::to_string_pretty(&report)?))?;
            } else {
                emit(&format!(
                    "Indexed {} ({} files, {} chunks, {} skipped)\n",
                    report.repo_id, report.file_count, report.chunk_count, report.skipped_count
                ))?;
            }
        }

        Commands::Query { query, repo, model } => {
            let engine = Engine::from_config(EngineConfig::from_env());
            let outcome = engine
                .chat(&query, repo.as_deref(), model.as_deref())
                .await
                .context("query failed")?;

            if cli.format == "json" {
                emit(&format!("{}\n", serde_json::to_string_pretty(&outcome)?))?;
            } else {
                let mut text = String::new();
                text.push_str(&outcome.answer);
                text.push('\n');
                if !outcome.sources.is_empty() {
                    text.push('\n');
                    for source in &outcome.sources {
                        text.push_str(&format!("  {} (L{})\n", source.file, source.lines));
                    }
                }
                text.push_str(&format!(
                    "\nintent: {}  confidence: {:.2}\n",
                    outcome.intent, outcome.confidence.score
                ));
                emit(&text)?;
            }
        }

        Commands::List => {
            let engine = Engine::from_config(EngineConfig::from_env());
            let repos = engine.list_repos();

            if cli.format == "json" {
                emit(&format!("{}\n", serde_json::to_string_pretty(&repos)?))?;
            } else if repos.is_empty() {
                emit("No repositories indexed\n")?;
            } else {
                let mut text = String::new();
                for repo in &repos {
                    text.push_str(&format!(
                        "{}  {} files, {} chunks  {}\n",
                        repo.id, repo.file_count, repo.chunk_count, repo.url
                    ));
                }
                emit(&text)?;
            }
        }

        Commands::Delete { url } => {
            let engine = Engine::from_config(EngineConfig::from_env());
            engine.delete_repo(&url).await.context("delete failed")?;
            emit(&format!("Deleted {url}\n"))?;
        }
    }

    Ok(())
}
