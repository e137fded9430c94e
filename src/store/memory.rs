//! In-memory store with insertion-ordered prefix scans.

use super::{KvStore, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Keys in first-insertion order plus their current values.
#[derive(Debug, Default)]
pub(crate) struct OrderedEntries {
    order: Vec<String>,
    values: HashMap<String, Value>,
}

impl OrderedEntries {
    pub(crate) fn insert(&mut self, key: &str, value: Value) {
        if self.values.insert(key.to_string(), value).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    pub(crate) fn scan(&self, prefix: &str) -> Vec<Value> {
        self.order
            .iter()
            .filter(|k| k.starts_with(prefix))
            .filter_map(|k| self.values.get(k).cloned())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

/// A non-durable [`KvStore`] for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<OrderedEntries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, OrderedEntries>, StoreError> {
        self.entries
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, OrderedEntries>, StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl KvStore for MemoryStore {
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write()?.insert(key, value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.get(key))
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self.read()?.scan(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_scan_keeps_insertion_order() {
        let store = MemoryStore::new();
        store.set("event:3:a", json!(3)).unwrap();
        store.set("pageview:1:a", json!("p")).unwrap();
        store.set("event:1:a", json!(1)).unwrap();
        store.set("event:2:a", json!(2)).unwrap();

        assert_eq!(
            store.get_by_prefix("event:").unwrap(),
            vec![json!(3), json!(1), json!(2)]
        );
        assert_eq!(store.get_by_prefix("pageview:").unwrap(), vec![json!("p")]);
        assert!(store.get_by_prefix("session:").unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_replaces_in_place() {
        let store = MemoryStore::new();
        store.set("session:a", json!({"v": 1})).unwrap();
        store.set("session:b", json!({"v": 2})).unwrap();
        store.set("session:a", json!({"v": 3})).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("session:a").unwrap(), Some(json!({"v": 3})));
        assert_eq!(
            store.get_by_prefix("session:").unwrap(),
            vec![json!({"v": 3}), json!({"v": 2})]
        );
    }

    #[test]
    fn test_get_missing_key() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("nope").unwrap(), None);
    }
}
