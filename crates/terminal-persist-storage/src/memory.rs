//! In-memory key-value store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use terminal_persist_core::{Error, Result};

use crate::store::KeyValueStore;

/// In-memory implementation of [`KeyValueStore`].
///
/// Clones share the same map. An optional quota bounds the total size of
/// stored values; a write that would exceed it fails with `StorageFull`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that holds at most `quota_bytes` of values.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            values: Arc::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Whether `key` is present.
    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    /// Total size of stored values in bytes.
    pub async fn used_bytes(&self) -> usize {
        self.values.read().await.values().map(String::len).sum()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().await;

        if let Some(quota) = self.quota_bytes {
            let others: usize = values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > quota {
                return Err(Error::StorageFull(format!(
                    "writing {} bytes to '{}' would exceed quota of {} bytes",
                    value.len(),
                    key,
                    quota
                )));
            }
        }

        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
