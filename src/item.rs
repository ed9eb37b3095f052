// SPDX-License-Identifier: MIT OR Apache-2.0

//! Items handed to the engine by the data layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A record owned by the data layer.
///
/// The engine reads `content` and writes `embedded_text` and `embedding`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Current text; `None` means the record has no text to embed.
    #[serde(default)]
    pub content: Option<String>,
    /// Text the stored embedding was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_text: Option<String>,
    /// Stored vector representation (see `embedding::codec`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
}

impl Item {
    /// Creates an item that has never been embedded.
    pub fn new(id: impl Into<ItemId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: Some(content.into()),
            embedded_text: None,
            embedding: None,
        }
    }

    /// Replaces the item's text, leaving its cached embedding in place.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
    }
}
