// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - vectors, their codec and the stores that rank them
//!
//! Providers turn normalized text into vectors; stores hold one vector per
//! item and answer brute-force cosine similarity queries.

pub mod codec;
pub mod memory;
pub mod provider;
pub mod similarity;
pub mod storage;

pub use codec::{decode, encode, try_decode, EMPTY_VECTOR};
pub use memory::MemoryStore;
pub use provider::{
    create_provider, normalize_text, CommandProvider, DummyProvider, EmbeddingProvider,
    FastEmbedder, GeminiProvider, HashingProvider,
};
pub use similarity::{cosine_similarity, rank};
pub use storage::{SimilarityResult, SqliteStore, StoredEntry, VectorStore};
