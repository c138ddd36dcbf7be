//! In-memory key-value store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::storage::KeyValueStore;

/// Map-backed store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store pre-populated with `entries`
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        {
            let mut map = store.map();
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
        }
        store
    }

    /// Snapshot of all keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.map().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.map().remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.map();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        assert_eq!(store.get("isLoggedIn").await.unwrap(), None);

        store.set("isLoggedIn", "true").await.unwrap();
        assert_eq!(store.get("isLoggedIn").await.unwrap().as_deref(), Some("true"));
        assert!(store.contains("isLoggedIn").await.unwrap());

        store.remove("isLoggedIn").await.unwrap();
        assert!(!store.contains("isLoggedIn").await.unwrap());

        // Removing again is fine
        store.remove("isLoggedIn").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemoryStore::with_entries([("userMobile", "9876543210")]);
        let clone = store.clone();
        clone.remove_many(&["userMobile", "userEmail"]).await.unwrap();
        assert!(store.is_empty());
    }
}
