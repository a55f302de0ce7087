#![allow(clippy::doc_markdown)]
//! `bitrank` - operator tool for Bitrank retrieval snapshots.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bitrank_core::{BitrankConfig, LogFormat};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

/// Bitrank - hybrid binary-quantized retrieval
#[derive(Parser, Debug)]
#[command(name = "bitrank")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "BITRANK_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a JSONL corpus of embedded chunks into a snapshot
    Ingest {
        /// JSONL file, one chunk per line
        #[arg(long)]
        corpus: PathBuf,
        /// Snapshot file to write
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Run a query against a snapshot
    Query {
        /// Snapshot file
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Comma-separated floats, or @file with a JSON array
        #[arg(short, long, allow_hyphen_values = true)]
        embedding: String,
        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Candidate pool size
        #[arg(short, long)]
        pool: Option<usize>,
        /// Restrict to a product id
        #[arg(long)]
        product_id: Option<String>,
        /// Restrict to a theme
        #[arg(long)]
        theme: Option<String>,
        /// Restrict to a source
        #[arg(long)]
        source: Option<String>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compact the index and rebuild partitions, rewriting the snapshot
    Reindex {
        /// Snapshot file
        #[arg(short, long)]
        snapshot: PathBuf,
    },
    /// Measure partitioned recall against the flat scan
    Validate {
        /// Snapshot file
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Stored codes replayed as queries
        #[arg(short, long, default_value = "100")]
        queries: usize,
        /// Candidate pool compared
        #[arg(short, long, default_value = "50")]
        pool: usize,
    },
    /// Print index statistics
    Stats {
        /// Snapshot file
        #[arg(short, long)]
        snapshot: PathBuf,
    },
}

fn init_tracing(config: &BitrankConfig, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (text, json) = match config.logging.format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BitrankConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Command::Ingest { corpus, out } => commands::ingest(&config, &corpus, &out),
        Command::Query {
            snapshot,
            embedding,
            top_k,
            pool,
            product_id,
            theme,
            source,
            json,
        } => {
            let args = commands::QueryArgs {
                embedding,
                top_k,
                pool,
                product_id,
                theme,
                source,
                json,
            };
            commands::query(&config, &snapshot, &args)
        }
        Command::Reindex { snapshot } => commands::reindex(&config, &snapshot),
        Command::Validate {
            snapshot,
            queries,
            pool,
        } => commands::validate(&config, &snapshot, queries, pool),
        Command::Stats { snapshot } => commands::stats(&config, &snapshot),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
