// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store statistics

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::session;
use embedsearch::config::Config;
use embedsearch::embedding::codec::try_decode;
use embedsearch::embedding::{SqliteStore, StoredEntry, VectorStore};
use embedsearch::output::{colorize_label, print_json, use_colors};

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub path: String,
    pub entries: usize,
    /// Entries holding the empty sentinel from a failed provider call
    pub failed: usize,
    /// Entries that do not decode
    pub malformed: usize,
    /// Decodable entries whose length differs from the recorded dimension
    pub wrong_dimension: usize,
    pub dimension: Option<usize>,
    pub model: Option<String>,
    pub schema_version: Option<String>,
}

/// Classify stored entries against the recorded dimension.
pub fn collect(store: &SqliteStore) -> Result<StoreStats> {
    let dimension = store
        .get_meta("embedding_length")?
        .and_then(|raw| raw.parse::<usize>().ok());
    let entries: Vec<StoredEntry> = store.snapshot()?;

    let mut stats = StoreStats {
        path: store.path().display().to_string(),
        entries: entries.len(),
        dimension,
        model: store.get_meta("embedding_model")?,
        schema_version: store.get_meta("schema_version")?,
        ..Default::default()
    };

    for entry in &entries {
        match try_decode(&entry.representation) {
            Ok(vector) if vector.is_empty() => stats.failed += 1,
            Ok(vector) => {
                if dimension.is_some_and(|d| d != vector.len()) {
                    stats.wrong_dimension += 1;
                }
            }
            Err(_) => stats.malformed += 1,
        }
    }

    Ok(stats)
}

/// Run the stats command
pub fn run(store: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = Config::load();
    let store = session::open_existing_store(store, &config)?;
    let stats = collect(&store)?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Text => {
            let color = use_colors();
            let show = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
            println!("{} {}", colorize_label("Store:", color), stats.path);
            println!("{} {}", colorize_label("Entries:", color), stats.entries);
            println!("{} {}", colorize_label("Failed:", color), stats.failed);
            println!("{} {}", colorize_label("Malformed:", color), stats.malformed);
            println!(
                "{} {}",
                colorize_label("Wrong dimension:", color),
                stats.wrong_dimension
            );
            println!(
                "{} {}",
                colorize_label("Dimension:", color),
                show(stats.dimension.map(|d| d.to_string()))
            );
            println!("{} {}", colorize_label("Model:", color), show(stats.model.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedsearch::ItemId;

    #[test]
    fn collect_classifies_entries() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.bind_embedding_config(2, "hashing-2").unwrap();
        store.upsert(&ItemId::from("ok"), &[1.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("failed"), &[]).unwrap();
        store.upsert(&ItemId::from("short"), &[1.0]).unwrap();
        store.upsert_raw(&ItemId::from("bad"), "[1,").unwrap();

        let stats = collect(&store).unwrap();
        assert_eq!(stats.entries, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.wrong_dimension, 1);
        assert_eq!(stats.dimension, Some(2));
        assert_eq!(stats.model.as_deref(), Some("hashing-2"));
        assert_eq!(stats.schema_version.as_deref(), Some("1"));
    }
}
