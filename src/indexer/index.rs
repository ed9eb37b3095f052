// SPDX-License-Identifier: MIT OR Apache-2.0

//! Brings item embeddings up to date from a JSON items file

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::session;
use embedsearch::output::print_json;
use embedsearch::{EmbeddingOutcome, Item, SearchEngine};

/// Per-run tally of embedding outcomes
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct IndexSummary {
    pub total: usize,
    pub embedded: usize,
    pub fresh: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    /// Items whose provider call failed, with the reason
    pub failures: Vec<FailedItem>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FailedItem {
    pub id: String,
    pub error: String,
}

fn load_items(path: &Path) -> Result<Vec<Item>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse items file: {}", path.display()))
}

fn save_items(path: &Path, items: &[Item]) -> Result<()> {
    let json = serde_json::to_string_pretty(items)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write items file: {}", path.display()))
}

/// Runs `ensure_embedding` over `items` in order.
///
/// Items are embedded one at a time so the store keeps the file's order for
/// ties. Provider failures are tallied; configuration and store errors abort.
pub fn embed_items(
    engine: &SearchEngine,
    items: &mut [Item],
    force: bool,
    pb: &ProgressBar,
) -> Result<IndexSummary> {
    let mut summary = IndexSummary {
        total: items.len(),
        ..Default::default()
    };

    for item in items.iter_mut() {
        pb.set_message(item.id.to_string());
        if force {
            item.embedding = None;
        }

        match engine
            .ensure_embedding(item)
            .with_context(|| format!("Failed to embed item {}", item.id))?
        {
            EmbeddingOutcome::Fresh => summary.fresh += 1,
            EmbeddingOutcome::Embedded => summary.embedded += 1,
            EmbeddingOutcome::SkippedEmptyText => summary.skipped_empty += 1,
            EmbeddingOutcome::Failed(err) => {
                summary.failed += 1;
                summary.failures.push(FailedItem {
                    id: item.id.to_string(),
                    error: err.to_string(),
                });
            }
        }
        pb.inc(1);
    }

    Ok(summary)
}

/// Run the index command
pub fn run(items_path: &Path, force: bool, store: Option<&Path>, format: OutputFormat) -> Result<()> {
    let session = session::open_for_index(store)?;
    let mut items = load_items(items_path)?;

    let pb = if format == OutputFormat::Text {
        ProgressBar::new(items.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} items | Embedding {msg}")?
            .progress_chars("##."),
    );

    let result = embed_items(&session.engine, &mut items, force, &pb);
    pb.finish_and_clear();

    // Save whatever was embedded before an abort; the store already has it.
    save_items(items_path, &items)?;
    let summary = result?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => {
            for failure in &summary.failures {
                eprintln!(
                    "{} embedding failed for {}: {}",
                    "Warning:".yellow(),
                    failure.id,
                    failure.error
                );
            }
            println!(
                "{} Embedded {} items ({} unchanged, {} empty, {} failed, {} total)",
                "✓".green(),
                summary.embedded.to_string().cyan(),
                summary.fresh.to_string().dimmed(),
                summary.skipped_empty,
                summary.failed,
                summary.total
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedsearch::config::{EmbeddingProviderType, EngineSettings};
    use embedsearch::embedding::{HashingProvider, MemoryStore};
    use std::sync::Arc;

    fn engine() -> SearchEngine {
        let settings = EngineSettings::new(EmbeddingProviderType::Hashing, 32);
        SearchEngine::new(
            settings,
            Arc::new(HashingProvider::new(32)),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn embed_items_tallies_outcomes() {
        let engine = engine();
        let mut items = vec![Item::new("a", "cats are great"), Item::new("b", "")];

        let summary = embed_items(&engine, &mut items, false, &ProgressBar::hidden()).unwrap();
        assert_eq!(summary.embedded, 1);
        assert_eq!(summary.skipped_empty, 1);

        let summary = embed_items(&engine, &mut items, false, &ProgressBar::hidden()).unwrap();
        assert_eq!(summary.fresh, 1);
        assert_eq!(summary.embedded, 0);

        let summary = embed_items(&engine, &mut items, true, &ProgressBar::hidden()).unwrap();
        assert_eq!(summary.embedded, 1);
    }

    #[test]
    fn items_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, r#"[{"id": "1", "content": "hello"}]"#).unwrap();

        let mut items = load_items(&path).unwrap();
        embed_items(&engine(), &mut items, false, &ProgressBar::hidden()).unwrap();
        save_items(&path, &items).unwrap();

        let reloaded = load_items(&path).unwrap();
        assert_eq!(reloaded[0].embedded_text.as_deref(), Some("hello"));
        assert!(reloaded[0].embedding.is_some());
    }
}
