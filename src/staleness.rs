// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides when an item's cached embedding must be recomputed.
//!
//! An embedding is stale when the item has no usable stored vector or when
//! the text it was computed from differs from the current text. The
//! comparison is on the raw text, so whitespace changes count.

use crate::embedding::codec::try_decode;
use crate::item::Item;

/// Why an item does or does not need a new embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Stored vector is usable and matches the current text.
    Fresh,
    /// No vector has been stored.
    Missing,
    /// Stored representation is malformed or has the wrong dimension.
    Invalid,
    /// Stored vector is the empty sentinel left by a failed provider call.
    PreviousFailure,
    /// Text changed since the vector was computed.
    ContentChanged,
}

impl Staleness {
    pub fn needs_embedding(self) -> bool {
        self != Staleness::Fresh
    }
}

/// Lifecycle state of an item's embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingState {
    Unembedded,
    /// A provider call for the item is in flight.
    Embedding,
    Embedded,
    /// Holds the empty sentinel after a provider failure.
    Failed,
}

/// Evaluates staleness for `item` against deployment dimension `dimension`.
///
/// With `retry_failed` the empty sentinel counts as absent; without it a
/// failed item is only retried once its text changes.
pub fn check(item: &Item, dimension: usize, retry_failed: bool) -> Staleness {
    let Some(representation) = item.embedding.as_deref() else {
        return Staleness::Missing;
    };

    match try_decode(representation) {
        Ok(vector) if vector.is_empty() => {
            if retry_failed {
                return Staleness::PreviousFailure;
            }
        }
        Ok(vector) if vector.len() == dimension => {}
        _ => return Staleness::Invalid,
    }

    if item.embedded_text != item.content {
        return Staleness::ContentChanged;
    }

    Staleness::Fresh
}

/// Derives the resting lifecycle state from the item's stored fields.
pub fn state(item: &Item, dimension: usize) -> EmbeddingState {
    match item.embedding.as_deref().map(try_decode) {
        None => EmbeddingState::Unembedded,
        Some(Ok(vector)) if vector.is_empty() => EmbeddingState::Failed,
        Some(Ok(vector)) if vector.len() == dimension => EmbeddingState::Embedded,
        Some(_) => EmbeddingState::Unembedded,
    }
}
