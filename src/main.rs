//! # MediRAG CLI (`medirag`)
//!
//! ## Usage
//!
//! ```bash
//! medirag --config ./config/medirag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medirag ingest <path>...` | Load, clean, split and index documents (rebuilds the collection) |
//! | `medirag search "<query>"` | Run the two-stage retriever and print the parents found |
//! | `medirag ask "<question>"` | Answer a single question |
//! | `medirag chat` | Interactive conversation with three-turn memory |
//! | `medirag check` | Verify the LLM credential and vector store connectivity |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `medirag=info,medirag_core=info`). A `.env` file in the working
//! directory is loaded before anything else.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use medirag::config;

/// MediRAG: conversational retrieval over medical documents.
#[derive(Parser)]
#[command(
    name = "medirag",
    about = "MediRAG: conversational retrieval over medical documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/medirag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest PDF, text and Markdown files into the vector store.
    ///
    /// Drops and recreates the collection, then uploads every parent and
    /// child fragment.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Report page and fragment counts without touching the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve the most relevant parent fragments for a query.
    Search {
        query: String,

        /// Number of parents to return (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer one question, with no conversation history.
    Ask { question: String },

    /// Start an interactive conversation.
    Chat,

    /// Check the LLM credential and vector store connectivity.
    Check,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("medirag=info,medirag_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    // `check` must run even without a config file.
    let cfg = match cli.command {
        Commands::Check => config::load_config(&cli.config).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            config::Config::minimal()
        }),
        _ => config::load_config(&cli.config)?,
    };

    match cli.command {
        Commands::Ingest { paths, dry_run } => {
            medirag::ingest::run_ingest(&cfg, &paths, dry_run).await?;
        }
        Commands::Search { query, k } => {
            medirag::search::run_search(&cfg, &query, k).await?;
        }
        Commands::Ask { question } => {
            medirag::chat::run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            medirag::chat::run_chat(&cfg).await?;
        }
        Commands::Check => {
            medirag::check::run_check(&cfg).await?;
        }
    }

    Ok(())
}
