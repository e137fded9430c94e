//! Key-value store contract.
//!
//! The ingestion and aggregation code only ever talks to a [`KvStore`]:
//! single-key writes that are atomic on their own, point reads, and ordered
//! prefix scans. No cross-key transactions are offered or needed.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde_json::Value;
use std::sync::Arc;

/// A durable mapping from string key to JSON value.
pub trait KvStore: Send + Sync {
    /// Insert or overwrite `key`.
    ///
    /// Overwriting keeps the key's original position in scan order.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Read a single key.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// All values whose key starts with `prefix`, in insertion order.
    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError>;
}

/// Thread-safe shared store handle.
pub type SharedStore = Arc<dyn KvStore>;

/// Store errors.
#[derive(Debug)]
pub enum StoreError {
    /// Backing file could not be read or written
    Io(String),
    /// A persisted entry could not be encoded or decoded
    Serialization(String),
    /// The store cannot serve requests at all
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Store IO error: {e}"),
            StoreError::Serialization(e) => write!(f, "Store serialization error: {e}"),
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
