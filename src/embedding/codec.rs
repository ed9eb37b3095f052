// SPDX-License-Identifier: MIT OR Apache-2.0

//! Textual representation of embedding vectors.
//!
//! Vectors are stored as a JSON array of numbers, e.g. `[0.25,-1.5,3]`. The
//! empty vector `[]` doubles as the sentinel written when an embedding could
//! not be produced. Decoding also accepts the spaced list syntax written by
//! older stores (`[0.25, -1.5, 3.0]`).

use crate::errors::CodecError;

/// Representation of the empty vector sentinel.
pub const EMPTY_VECTOR: &str = "[]";

/// Encodes a vector into its stored representation.
///
/// Uses the shortest decimal form that reads back as the same `f32`.
/// Non-finite values have no representation and encode as `null`, which
/// `decode` rejects.
pub fn encode(vector: &[f32]) -> String {
    if vector.is_empty() {
        return EMPTY_VECTOR.to_string();
    }
    serde_json::to_string(vector).unwrap_or_else(|_| EMPTY_VECTOR.to_string())
}

/// Decodes a stored representation, reporting why it is unusable.
pub fn try_decode(representation: &str) -> Result<Vec<f32>, CodecError> {
    let values: Vec<f64> = serde_json::from_str(representation.trim())
        .map_err(|e| CodecError::Malformed(e.to_string()))?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            if value.is_finite() && value.abs() <= f64::from(f32::MAX) {
                Ok(value as f32)
            } else {
                Err(CodecError::NonFinite { index })
            }
        })
        .collect()
}

/// Decodes a stored representation.
///
/// Never fails: malformed input yields the empty vector, which callers skip
/// because its length cannot match a real query vector.
pub fn decode(representation: &str) -> Vec<f32> {
    try_decode(representation).unwrap_or_default()
}
