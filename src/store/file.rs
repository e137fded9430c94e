//! Durable store backed by an append-only JSON-lines log.
//!
//! Every `set` appends one `{"key": .., "value": ..}` line and flushes it
//! before updating the in-memory index. Opening the store replays the log,
//! so the last write for a key wins and scan order is first-insertion order.
//!
//! A line is only ever appended after a newline: a failed append is cut back
//! off the log, and any leftover unterminated tail is closed before the next
//! write.

use super::memory::OrderedEntries;
use super::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    key: String,
    value: Value,
}

struct Inner {
    entries: OrderedEntries,
    log: File,
}

/// A [`KvStore`] that survives restarts.
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileStore {
    /// Open (or create) the log at `path` and replay it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = OrderedEntries::default();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(line) {
                    Ok(entry) => entries.insert(&entry.key, entry.value),
                    // A torn final line from a crash mid-append is skipped.
                    Err(e) => tracing::warn!(
                        "Skipping unreadable store entry at {}:{}: {}",
                        path.display(),
                        line_no + 1,
                        e
                    ),
                }
            }
        }

        let mut log = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        close_torn_tail(&mut log)?;
        tracing::debug!("Opened store {} with {} keys", path.display(), entries.len());

        Ok(Self {
            path,
            inner: Mutex::new(Inner { entries, log }),
        })
    }

    /// Location of the backing log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl KvStore for FileStore {
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let entry = LogEntry {
            key: key.to_string(),
            value,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut inner = self.lock()?;
        let Inner { entries, log } = &mut *inner;

        let start = close_torn_tail(log)?;
        if let Err(e) = log.write_all(line.as_bytes()).and_then(|()| log.flush()) {
            if let Err(truncate) = log.set_len(start) {
                tracing::warn!(
                    "Could not roll back partial append to {}: {}",
                    self.path.display(),
                    truncate
                );
            }
            return Err(e.into());
        }
        entries.insert(&entry.key, entry.value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock()?.entries.get(key))
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self.lock()?.entries.scan(prefix))
    }
}

/// Terminate an unfinished last line, if any, and return the log length.
fn close_torn_tail(log: &mut File) -> Result<u64, StoreError> {
    let len = log.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    log.seek(SeekFrom::Start(len - 1))?;
    log.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    tracing::warn!("Closing unterminated line at end of store log");
    log.write_all(b"\n")?;
    log.flush()?;
    Ok(len + 1)
}
