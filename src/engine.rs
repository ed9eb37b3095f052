// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search façade tying staleness checks, the embedding provider and the
//! vector store together.
//!
//! Persisting an item and embedding it are separate steps: the caller writes
//! the item's content, then calls [`SearchEngine::ensure_embedding`] and
//! persists the updated `embedding`/`embedded_text` fields it gets back.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EngineSettings;
use crate::embedding::codec::{encode, EMPTY_VECTOR};
use crate::embedding::provider::{normalize_text, EmbeddingProvider};
use crate::embedding::storage::{SimilarityResult, VectorStore};
use crate::errors::{ConfigError, EngineError, ProviderError, SearchError};
use crate::item::{Item, ItemId};
use crate::staleness::{self, EmbeddingState};

/// How long a timed-out call gets to run its own cleanup before we return.
/// Providers that enforce the same deadline (command, HTTP) finish within it.
const ABANDON_GRACE: Duration = Duration::from_secs(1);

/// What `ensure_embedding` did for an item.
#[derive(Debug)]
pub enum EmbeddingOutcome {
    /// Stored vector already matched the content; no provider call.
    Fresh,
    /// A new vector was computed and stored.
    Embedded,
    /// Content is empty after normalization; any old vector was cleared.
    SkippedEmptyText,
    /// The provider failed. The empty sentinel was stored in place of a vector.
    Failed(ProviderError),
}

impl EmbeddingOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, EmbeddingOutcome::Failed(_))
    }
}

/// Embedding-backed similarity search over a vector store.
pub struct SearchEngine {
    settings: EngineSettings,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    /// Number of provider calls running per item
    in_flight: Mutex<HashMap<ItemId, usize>>,
}

impl SearchEngine {
    /// Creates an engine. Fails if the provider reports a fixed dimension
    /// different from the configured one.
    pub fn new(
        settings: EngineSettings,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, ConfigError> {
        if let Some(actual) = provider.dimension() {
            if actual != settings.dimension {
                return Err(ConfigError::DimensionMismatch {
                    expected: settings.dimension,
                    actual,
                });
            }
        }

        Ok(Self {
            settings,
            provider,
            store,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Brings the item's embedding up to date with its content.
    ///
    /// Provider failures are not errors here: the sentinel is stored and the
    /// failure comes back as [`EmbeddingOutcome::Failed`]. Errors are limited
    /// to store failures and a provider returning the wrong dimension.
    pub fn ensure_embedding(&self, item: &mut Item) -> Result<EmbeddingOutcome, EngineError> {
        let staleness =
            staleness::check(item, self.settings.dimension, self.settings.retry_failed);
        if !staleness.needs_embedding() {
            debug!(item = %item.id, "embedding is fresh");
            return Ok(EmbeddingOutcome::Fresh);
        }

        let content = item.content.clone();
        let text = normalize_text(content.as_deref().unwrap_or_default());
        if text.is_empty() {
            debug!(item = %item.id, "no text to embed; clearing vector");
            self.store.remove(&item.id).map_err(EngineError::Store)?;
            item.embedding = None;
            item.embedded_text = None;
            return Ok(EmbeddingOutcome::SkippedEmptyText);
        }

        debug!(item = %item.id, ?staleness, "embedding item");
        let result = {
            let _guard = InFlight::enter(&self.in_flight, &item.id);
            self.embed(text)
        };

        match result {
            Ok(vector) => {
                self.check_dimension(&vector)?;
                let representation = encode(&vector);
                self.store
                    .upsert_raw(&item.id, &representation)
                    .map_err(EngineError::Store)?;
                item.embedding = Some(representation);
                item.embedded_text = content;
                Ok(EmbeddingOutcome::Embedded)
            }
            Err(err) => {
                warn!(item = %item.id, error = %err, "embedding failed; storing empty vector");
                self.store
                    .upsert_raw(&item.id, EMPTY_VECTOR)
                    .map_err(EngineError::Store)?;
                item.embedding = Some(EMPTY_VECTOR.to_string());
                item.embedded_text = content;
                Ok(EmbeddingOutcome::Failed(err))
            }
        }
    }

    /// Ranks stored items by similarity to `query`, best first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SimilarityResult>, SearchError> {
        let text = normalize_text(query);
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let vector = self.embed(text).map_err(SearchError::ProviderUnavailable)?;
        self.check_dimension(&vector)?;

        let results = self
            .store
            .query(&vector, limit)
            .map_err(SearchError::Store)?;
        debug!(results = results.len(), limit, "search complete");
        Ok(results)
    }

    /// Current lifecycle state of the item's embedding.
    pub fn state(&self, item: &Item) -> EmbeddingState {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&item.id);
        if in_flight {
            EmbeddingState::Embedding
        } else {
            staleness::state(item, self.settings.dimension)
        }
    }

    /// Calls the provider on a worker thread, bounded by the configured timeout.
    ///
    /// A timed-out call is abandoned after [`ABANDON_GRACE`]; its result is
    /// dropped. Providers are configured with the same timeout and stop their
    /// own work (child processes, requests) when it expires.
    fn embed(&self, text: String) -> Result<Vec<f32>, ProviderError> {
        let timeout = self.settings.timeout;
        let provider = Arc::clone(&self.provider);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("embedsearch-provider".to_string())
            .spawn(move || {
                // The receiver is gone if we timed out.
                let _ = tx.send(provider.embed_one(&text));
            })
            .map_err(|e| ProviderError::Failed(format!("failed to spawn provider call: {}", e)))?;

        let vector = match rx.recv_timeout(timeout) {
            Ok(Ok(vector)) => vector,
            Ok(Err(err)) => return Err(ProviderError::Failed(format!("{:#}", err))),
            Err(RecvTimeoutError::Timeout) => {
                let _ = rx.recv_timeout(ABANDON_GRACE);
                return Err(ProviderError::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ProviderError::Failed(
                    "provider call ended without a result".to_string(),
                ))
            }
        };

        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(ProviderError::InvalidVector { index });
        }
        Ok(vector)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), ConfigError> {
        if vector.len() != self.settings.dimension {
            return Err(ConfigError::DimensionMismatch {
                expected: self.settings.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Marks an item as in flight until dropped.
///
/// Calls for the same item may overlap, so entries are counted and the item
/// leaves the map only when its last call ends.
struct InFlight<'a> {
    calls: &'a Mutex<HashMap<ItemId, usize>>,
    item_id: ItemId,
}

impl<'a> InFlight<'a> {
    fn enter(calls: &'a Mutex<HashMap<ItemId, usize>>, item_id: &ItemId) -> Self {
        *calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(item_id.clone())
            .or_insert(0) += 1;
        Self {
            calls,
            item_id: item_id.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = calls.get_mut(&self.item_id) {
            *count -= 1;
            if *count == 0 {
                calls.remove(&self.item_id);
            }
        }
    }
}
