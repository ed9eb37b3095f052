// SPDX-License-Identifier: MIT OR Apache-2.0

//! embedsearch - Embedding-backed similarity search tool
//!
//! Keeps item embeddings fresh through a pluggable provider and ranks
//! stored items by cosine similarity to a query.

mod cli;
mod indexer;
mod query;
mod session;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with EMBEDSEARCH_LOG env var (e.g., EMBEDSEARCH_LOG=debug embedsearch search "query")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EMBEDSEARCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let store = cli.store.as_deref();

    match cli.command {
        Commands::Index { items, force } => {
            indexer::index::run(&items, force, store, format)?;
        }
        Commands::Search { query, limit } => {
            query::search::run(&query, limit, store, format)?;
        }
        Commands::Stats => {
            query::stats::run(store, format)?;
        }
        Commands::Remove { id } => {
            indexer::remove::run(&id, store, format)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "embedsearch", &mut std::io::stdout());
        }
    }

    Ok(())
}
