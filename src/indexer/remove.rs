// SPDX-License-Identifier: MIT OR Apache-2.0

//! Removes an item's vector from the store

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::session;
use embedsearch::config::Config;
use embedsearch::embedding::VectorStore;
use embedsearch::output::print_json;
use embedsearch::ItemId;

#[derive(Serialize)]
struct RemoveResult<'a> {
    id: &'a str,
    removed: bool,
}

/// Run the remove command
pub fn run(id: &str, store: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = Config::load();
    let store = session::open_existing_store(store, &config)?;
    let removed = store.remove(&ItemId::from(id))?;

    match format {
        OutputFormat::Json => print_json(&RemoveResult { id, removed })?,
        OutputFormat::Text if removed => println!("{} Removed {}", "✓".green(), id),
        OutputFormat::Text => println!("{} No vector stored for {}", "✗".red(), id.yellow()),
    }
    Ok(())
}
