//! Durable Storage
//!
//! The map document lives under one fixed key in a key-value surface. Writers
//! always replace the whole document; readers only ever observe complete
//! documents.
//!
//! - [`MemoryStorage`]: in-process slot with an optional byte quota.
//! - [`FileStorage`]: `<dir>/<key>.json`, written via temp file + rename.
//! - [`QueuedStorage`]: wraps another storage behind a single-writer tokio
//!   task so callers never block on I/O.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::map::bus::EventBus;
use crate::map::events::MapEvent;

/// Event type reported on `map:sync:error` for persistence failures.
pub const PERSIST_EVENT_TYPE: &str = "persist";

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Document larger than the storage allows.
    #[error("storage quota exceeded ({size} bytes > {limit} bytes)")]
    QuotaExceeded {
        /// Document size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Background writer has shut down.
    #[error("persistence queue closed")]
    Closed,
}

/// A key-value surface holding one map document.
pub trait MapStorage: Send + Sync {
    /// The durable key.
    fn key(&self) -> &str;

    /// Read the stored document, `None` if nothing has been written.
    fn read(&self) -> Result<Option<String>, StorageError>;

    /// Replace the stored document.
    fn write(&self, document: &str) -> Result<(), StorageError>;
}

/// In-memory storage.
#[derive(Debug)]
pub struct MemoryStorage {
    key: String,
    slot: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Empty storage for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            slot: Mutex::new(None),
            quota: None,
        }
    }

    /// Reject documents larger than `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Place a raw document in the slot, bypassing quota checks.
    pub fn seed(&self, document: impl Into<String>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(document.into());
    }
}

impl MapStorage for MemoryStorage {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn write(&self, document: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.quota {
            if document.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    size: document.len(),
                    limit,
                });
            }
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(document.to_string());
        Ok(())
    }
}

/// One JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    key: String,
    path: PathBuf,
}

impl FileStorage {
    /// Storage for `key` under `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>, key: impl Into<String>) -> Self {
        let key = key.into();
        let path = dir.as_ref().join(format!("{key}.json"));
        Self { key, path }
    }

    /// Path of the document file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MapStorage for FileStorage {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, document: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Rename is atomic on the same filesystem, so readers see old or new, never partial.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, document)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Asynchronous single-writer wrapper.
///
/// `write` hands the document to a background task and returns immediately.
/// Writes coalesce: if several documents are queued before the task runs,
/// only the latest reaches the inner storage. `read` returns the latest queued
/// document when one is pending, so a process always reads its own writes.
pub struct QueuedStorage {
    key: String,
    inner: Arc<dyn MapStorage>,
    tx: watch::Sender<Option<String>>,
}

impl QueuedStorage {
    /// Wrap `inner` and spawn the writer task on the current tokio runtime.
    ///
    /// Write failures in the background task are logged and, when `bus` is
    /// given, reported as `map:sync:error` with event type `persist`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(inner: Arc<dyn MapStorage>, bus: Option<EventBus>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = watch::channel::<Option<String>>(None);
        let writer = Arc::clone(&inner);

        let handle = tokio::spawn(async move {
            let mut last_attempted: Option<String> = None;
            loop {
                let closed = rx.changed().await.is_err();
                let pending = rx.borrow_and_update().clone();
                if let Some(document) = pending {
                    if last_attempted.as_deref() != Some(document.as_str()) {
                        match writer.write(&document) {
                            Ok(()) => {
                                debug!(
                                    key = writer.key(),
                                    bytes = document.len(),
                                    "queued write flushed"
                                );
                            }
                            Err(e) => {
                                error!(key = writer.key(), error = %e, "queued write failed");
                                if let Some(bus) = &bus {
                                    bus.emit(MapEvent::sync_error(
                                        e.to_string(),
                                        PERSIST_EVENT_TYPE,
                                    ));
                                }
                            }
                        }
                        last_attempted = Some(document);
                    }
                }
                if closed {
                    break;
                }
            }
            debug!(key = writer.key(), "persistence writer stopped");
        });

        let key = inner.key().to_string();
        (Self { key, inner, tx }, handle)
    }
}

impl MapStorage for QueuedStorage {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>, StorageError> {
        if let Some(pending) = self.tx.borrow().clone() {
            return Ok(Some(pending));
        }
        self.inner.read()
    }

    fn write(&self, document: &str) -> Result<(), StorageError> {
        self.tx
            .send(Some(document.to_string()))
            .map_err(|_| StorageError::Closed)
    }
}
