// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process vector store.

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::embedding::storage::{StoredEntry, VectorStore};
use crate::item::ItemId;

/// Vector store kept entirely in memory.
///
/// Entries keep the position of their first insertion; replacing a vector
/// does not move it. Queries clone the map under a read lock and score the
/// copy, so writers are only blocked for the duration of the copy.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<IndexMap<ItemId, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexMap<ItemId, String>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexMap<ItemId, String>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl VectorStore for MemoryStore {
    fn upsert_raw(&self, item_id: &ItemId, representation: &str) -> Result<()> {
        self.write()?
            .insert(item_id.clone(), representation.to_string());
        Ok(())
    }

    fn get_raw(&self, item_id: &ItemId) -> Result<Option<String>> {
        Ok(self.read()?.get(item_id).cloned())
    }

    fn remove(&self, item_id: &ItemId) -> Result<bool> {
        // shift_remove keeps the relative order of the remaining entries
        Ok(self.write()?.shift_remove(item_id).is_some())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    fn snapshot(&self) -> Result<Vec<StoredEntry>> {
        Ok(self
            .read()?
            .iter()
            .map(|(item_id, representation)| StoredEntry {
                item_id: item_id.clone(),
                representation: representation.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ranking_returns_top_two() {
        let store = MemoryStore::new();
        let query = [1.0, 0.0];
        for (id, cos) in [("a", 0.9f32), ("b", 0.5), ("c", 0.1)] {
            store
                .upsert(&ItemId::from(id), &[cos, (1.0 - cos * cos).sqrt()])
                .unwrap();
        }

        let results = store.query(&query, 2).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[test]
    fn test_isolation_of_corrupt_entry() {
        let store = MemoryStore::new();
        store.upsert(&ItemId::from("ok"), &[0.3, 0.4]).unwrap();
        store.upsert_raw(&ItemId::from("broken"), "[[0.3], 0.4]").unwrap();

        let results = store.query(&[0.3, 0.4], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id.as_str(), "ok");
    }

    #[test]
    fn test_get_and_remove() {
        let store = MemoryStore::new();
        let id = ItemId::from("x");
        assert_eq!(store.get(&id).unwrap(), None);

        store.upsert(&id, &[1.5]).unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(vec![1.5]));
        assert!(store.remove(&id).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_replacement_keeps_position() {
        let store = MemoryStore::new();
        store.upsert(&ItemId::from("a"), &[1.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("b"), &[1.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("a"), &[3.0, 0.0]).unwrap();

        let results = store.query(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_query_during_concurrent_upserts() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..100u64 {
            store.upsert(&ItemId::from(i), &[1.0, i as f32]).unwrap();
        }

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500u64 {
                    store.upsert(&ItemId::from(i % 150), &[0.5, i as f32]).unwrap();
                }
            })
        };

        for _ in 0..50 {
            let results = store.query(&[1.0, 0.0], 10).unwrap();
            assert_eq!(results.len(), 10);
        }
        writer.join().unwrap();
        assert_eq!(store.len().unwrap(), 150);
    }
}
