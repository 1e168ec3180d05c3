//! In-memory key-value store for testing and single-process use

use async_trait::async_trait;
use chanstate_core::{KvStore, StateResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory store with per-key compare-and-swap
pub struct MemoryKvStore {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    pub fn with_data(data: Vec<(String, Vec<u8>)>) -> Self {
        let store = Self::new();
        for (key, value) in data {
            store.data.insert(key, value);
        }
        store
    }

    /// Unconditionally store a payload; used to seed or import data
    pub fn raw_put(&self, key: &str, value: &[u8]) {
        self.data.insert(key.to_string(), value.to_vec());
    }

    /// Payload currently stored at `key`
    pub fn raw_get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryKvStore {
    fn clone(&self) -> Self {
        let new_store = Self::new();
        for entry in self.data.iter() {
            new_store.data.insert(entry.key().clone(), entry.value().clone());
        }
        new_store
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        Ok(self.raw_get(key))
    }

    async fn conditional_write(
        &self,
        key: &str,
        new: Option<&[u8]>,
        expected: Option<&[u8]>,
    ) -> StateResult<bool> {
        // The entry holds the shard lock until it is dropped
        match (self.data.entry(key.to_string()), expected) {
            (Entry::Occupied(mut entry), Some(expected)) if entry.get().as_slice() == expected => {
                match new {
                    Some(value) => {
                        entry.insert(value.to_vec());
                    }
                    None => {
                        entry.remove();
                    }
                }
                Ok(true)
            }
            (Entry::Vacant(entry), None) => {
                if let Some(value) = new {
                    entry.insert(value.to_vec());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, page: usize, per_page: usize) -> StateResult<Vec<String>> {
        let mut keys: Vec<String> = self.data.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .collect())
    }
}
