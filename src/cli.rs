// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// embedsearch - Embedding-backed similarity search
///
/// Embeds item text through a pluggable provider, keeps one vector per item
/// in a local SQLite store and ranks items by cosine similarity.
#[derive(Parser, Debug)]
#[command(name = "embedsearch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Path to the SQLite store (defaults to the nearest .embedsearch/embeddings.sqlite)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring embeddings up to date for the items in a JSON file
    ///
    /// The file holds an array of `{"id", "content", "embedded_text", "embedding"}`
    /// records and is rewritten with the updated embedding fields.
    Index {
        /// JSON file with the items to embed
        #[arg(long)]
        items: PathBuf,

        /// Re-embed every item, even when its stored vector is fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Rank stored items by similarity to a query
    #[command(alias = "s")]
    Search {
        /// Query text
        query: String,

        /// Maximum number of results to show
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,
    },

    /// Show store statistics
    Stats,

    /// Remove an item's vector from the store
    Remove {
        /// Item identifier
        id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_with_global_flags() {
        let cli = Cli::try_parse_from([
            "embedsearch",
            "search",
            "I love cats",
            "-m",
            "2",
            "--format",
            "json",
            "--store",
            "/tmp/x.sqlite",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/x.sqlite")));
        match cli.command {
            Commands::Search { query, limit } => {
                assert_eq!(query, "I love cats");
                assert_eq!(limit, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn index_requires_items() {
        assert!(Cli::try_parse_from(["embedsearch", "index"]).is_err());
    }
}
