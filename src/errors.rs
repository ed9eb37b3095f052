// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the embedding search engine.
//!
//! Codec and dimension errors are recovered per item inside bulk scans.
//! Provider errors are recovered on the save path and surfaced on the search
//! path. Configuration errors are fatal at startup.

use std::time::Duration;
use thiserror::Error;

/// A stored vector representation could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("malformed vector representation: {0}")]
    Malformed(String),

    #[error("vector component {index} is not a finite f32")]
    NonFinite { index: usize },
}

/// The embedding provider failed to produce a vector.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding provider failed: {0}")]
    Failed(String),

    #[error("embedding provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding provider returned a non-finite value at index {index}")]
    InvalidVector { index: usize },
}

/// Invalid or missing configuration. Never recovered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {name} value: {value}")]
    InvalidValue { name: String, value: String },

    #[error("missing provider credential: set {0}")]
    MissingCredential(String),

    #[error("embedding dimension mismatch: configured {expected}, provider returned {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("failed to initialize embedding provider: {0}")]
    Provider(String),
}

/// Failure of `ensure_embedding` that cannot be degraded to the empty sentinel.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("vector store error: {0:#}")]
    Store(anyhow::Error),
}

/// Failure of a similarity search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(#[source] ProviderError),

    #[error("query text is empty")]
    EmptyQuery,

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("vector store error: {0:#}")]
    Store(anyhow::Error),
}
