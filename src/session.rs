// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by the subcommands: config, store and engine.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use embedsearch::config::{Config, EngineSettings};
use embedsearch::embedding::provider::create_provider;
use embedsearch::embedding::storage::SqliteStore;
use embedsearch::utils::resolve_store_path;
use embedsearch::SearchEngine;

/// Loaded configuration plus an engine over the opened store.
pub struct Session {
    pub config: Config,
    pub engine: SearchEngine,
}

/// Precedence: `--store`, then `[store] path`, then the nearest
/// `.embedsearch` directory.
fn store_path(explicit: Option<&Path>, config: &Config) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    let configured = explicit.or(config.store.path.as_deref());
    let path = resolve_store_path(configured, &cwd);
    debug!(path = %path.display(), "using store");
    Ok(path)
}

/// Opens the store, creating it if needed.
fn open_store(explicit: Option<&Path>, config: &Config) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open(store_path(explicit, config)?)?))
}

/// Opens a store that must already exist.
pub fn open_existing_store(explicit: Option<&Path>, config: &Config) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open_existing(store_path(
        explicit, config,
    )?)?))
}

fn build(config: Config, settings: EngineSettings, store: Arc<SqliteStore>) -> Result<Session> {
    let provider = create_provider(&settings)?;
    let engine = SearchEngine::new(settings, provider, store)?;
    Ok(Session { config, engine })
}

/// Session for writing embeddings. Creates the store and records the
/// configured dimension and model in it.
pub fn open_for_index(explicit: Option<&Path>) -> Result<Session> {
    let config = Config::load();
    let settings = EngineSettings::resolve(&config)?;
    let store = open_store(explicit, &config)?;
    store.bind_embedding_config(settings.dimension, &settings.model)?;
    build(config, settings, store)
}

/// Session for querying. Leaves the store's recorded configuration alone.
pub fn open_for_search(explicit: Option<&Path>) -> Result<Session> {
    let config = Config::load();
    let settings = EngineSettings::resolve(&config)?;
    let store = open_existing_store(explicit, &config)?;
    build(config, settings, store)
}
