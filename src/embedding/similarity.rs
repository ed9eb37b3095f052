// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cosine similarity and brute-force ranking.

use rayon::prelude::*;
use tracing::debug;

use crate::embedding::codec::try_decode;
use crate::embedding::storage::{SimilarityResult, StoredEntry};

/// Computes cosine similarity between two vectors of equal length.
///
/// Returns exactly 0.0 when either vector has zero magnitude. Vectors of
/// different lengths are not comparable and also score 0.0; `rank` skips
/// them before scoring.
/// Accumulation happens in f64 so large finite components cannot overflow.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f64;
    let mut magnitude_a = 0.0f64;
    let mut magnitude_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot_product += x * y;
        magnitude_a += x * x;
        magnitude_b += y * y;
    }

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (magnitude_a.sqrt() * magnitude_b.sqrt());
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

/// Scores every entry against the query and returns the best `limit` results.
///
/// Entries that fail to decode or whose length differs from the query are
/// skipped. Results are sorted by descending similarity; ties keep the order
/// of `entries`.
pub fn rank(entries: &[StoredEntry], query: &[f32], limit: usize) -> Vec<SimilarityResult> {
    if limit == 0 || query.is_empty() {
        return Vec::new();
    }

    let scored: Vec<Option<SimilarityResult>> = entries
        .par_iter()
        .map(|entry| match try_decode(&entry.representation) {
            Ok(vector) if vector.len() == query.len() => Some(SimilarityResult::new(
                entry.item_id.clone(),
                cosine_similarity(query, &vector),
            )),
            Ok(vector) => {
                debug!(
                    item = %entry.item_id,
                    stored = vector.len(),
                    expected = query.len(),
                    "skipping vector with mismatched dimension"
                );
                None
            }
            Err(err) => {
                debug!(item = %entry.item_id, error = %err, "skipping undecodable vector");
                None
            }
        })
        .collect();

    let mut results: Vec<SimilarityResult> = scored.into_iter().flatten().collect();

    // Stable sort keeps insertion order among equal scores.
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}
