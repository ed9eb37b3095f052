// SPDX-License-Identifier: MIT OR Apache-2.0

//! embedsearch - Embedding-backed similarity search
//!
//! Decides when an item's cached embedding is stale, persists vectors in a
//! textual representation and ranks stored items by cosine similarity to a
//! query. Shared modules for the embedsearch CLI tool.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod item;
pub mod output;
pub mod staleness;
pub mod utils;

pub use engine::{EmbeddingOutcome, SearchEngine};
pub use item::{Item, ItemId};
