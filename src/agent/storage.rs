//! Client-side storage: the tab-scoped session slot and the bounded offline
//! buffers.
//!
//! [`BrowserStorage`] is a string-keyed item store in the shape of web
//! storage. The agent uses one instance scoped to the tab (session id) and
//! one shared across tabs (fallback buffers).

use crate::model::{PageView, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Local-storage key of the page-view fallback buffer.
pub const PAGEVIEW_BUFFER_KEY: &str = "analytics_pageviews";
/// Local-storage key of the session fallback buffer.
pub const SESSION_BUFFER_KEY: &str = "analytics_sessions";
/// Page views retained locally.
pub const PAGEVIEW_BUFFER_CAPACITY: usize = 50;
/// Sessions retained locally.
pub const SESSION_BUFFER_CAPACITY: usize = 20;

/// Storage errors.
#[derive(Debug)]
pub enum StorageError {
    /// Storage is disabled or inaccessible
    Unavailable(String),
    /// Backing file could not be read or written
    Io(String),
    /// Stored item could not be encoded or decoded
    Serialization(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Unavailable(e) => write!(f, "Storage unavailable: {e}"),
            StorageError::Io(e) => write!(f, "Storage IO error: {e}"),
            StorageError::Serialization(e) => write!(f, "Storage serialization error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// String item storage with web-storage semantics.
pub trait BrowserStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Replace `key` with `update(current)` while holding the storage lock,
    /// so concurrent read-modify-write cycles cannot interleave.
    fn update_item(
        &self,
        key: &str,
        update: &mut dyn FnMut(Option<&str>) -> Result<String, StorageError>,
    ) -> Result<(), StorageError>;
}

/// Shared storage handle.
pub type SharedStorage = Arc<dyn BrowserStorage>;

/// In-memory storage, optionally simulating a browser with storage disabled.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    disabled: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose every call fails, like a locked-down browser profile.
    pub fn disabled() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            disabled: true,
        }
    }

    fn items(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        if self.disabled {
            return Err(StorageError::Unavailable("storage is disabled".to_string()));
        }
        self.items
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl BrowserStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn update_item(
        &self,
        key: &str,
        update: &mut dyn FnMut(Option<&str>) -> Result<String, StorageError>,
    ) -> Result<(), StorageError> {
        let mut items = self.items()?;
        let next = update(items.get(key).map(String::as_str))?;
        items.insert(key.to_string(), next);
        Ok(())
    }
}

/// Storage persisted as one JSON object file, rewritten on every set.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let items = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileStorage {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.items
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    /// Write `next` to disk, then adopt it. A failed write leaves both the
    /// file and the in-memory view unchanged.
    fn commit(
        &self,
        items: &mut HashMap<String, String>,
        key: &str,
        value: String,
    ) -> Result<(), StorageError> {
        let mut next = items.clone();
        next.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&next)?;
        std::fs::write(&self.path, json)?;

        *items = next;
        Ok(())
    }
}

impl BrowserStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.lock()?;
        self.commit(&mut items, key, value.to_string())
    }

    fn update_item(
        &self,
        key: &str,
        update: &mut dyn FnMut(Option<&str>) -> Result<String, StorageError>,
    ) -> Result<(), StorageError> {
        let mut items = self.lock()?;
        let next = update(items.get(key).map(String::as_str))?;
        self.commit(&mut items, key, next)
    }
}

/// A bounded list kept as a JSON array under one storage key.
///
/// Pushing past capacity evicts the oldest entries first.
pub struct RingBuffer<T> {
    storage: SharedStorage,
    key: &'static str,
    capacity: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> RingBuffer<T> {
    pub fn new(storage: SharedStorage, key: &'static str, capacity: usize) -> Self {
        Self {
            storage,
            key,
            capacity,
            _item: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `item`, trimming the buffer back to capacity.
    ///
    /// The read and the write happen under the storage's lock, so buffers
    /// sharing one storage never lose each other's entries.
    pub fn push(&self, item: T) -> Result<(), StorageError> {
        let mut item = Some(item);
        let mut append = |current: Option<&str>| -> Result<String, StorageError> {
            let mut items = self.decode(current);
            items.extend(item.take());
            while items.len() > self.capacity {
                items.pop_front();
            }
            Ok(serde_json::to_string(&items)?)
        };
        self.storage.update_item(self.key, &mut append)
    }

    /// Buffered entries, oldest first. Unreadable buffers read as empty.
    pub fn items(&self) -> Vec<T> {
        match self.load() {
            Ok(items) => items.into(),
            Err(e) => {
                tracing::debug!("Could not read local buffer {}: {}", self.key, e);
                Vec::new()
            }
        }
    }

    fn load(&self) -> Result<VecDeque<T>, StorageError> {
        let current = self.storage.get_item(self.key)?;
        Ok(self.decode(current.as_deref()))
    }

    fn decode(&self, json: Option<&str>) -> VecDeque<T> {
        match json {
            Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
                tracing::warn!("Discarding corrupt local buffer {}: {}", self.key, e);
                VecDeque::new()
            }),
            None => VecDeque::new(),
        }
    }
}

/// The agent's two offline fallback buffers.
pub struct LocalBuffers {
    pub page_views: RingBuffer<PageView>,
    pub sessions: RingBuffer<Session>,
}

impl LocalBuffers {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            page_views: RingBuffer::new(
                storage.clone(),
                PAGEVIEW_BUFFER_KEY,
                PAGEVIEW_BUFFER_CAPACITY,
            ),
            sessions: RingBuffer::new(storage, SESSION_BUFFER_KEY, SESSION_BUFFER_CAPACITY),
        }
    }
}
