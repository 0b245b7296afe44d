//! Key-Value Storage
//!
//! Stores persist their state as one JSON string per storage key. The
//! backend is anything that can get, set, and remove strings by key; this
//! module defines that seam and ships two backends:
//!
//! - [`MemoryStorage`]: process-local map, the default.
//! - [`FileStorage`]: one file per key in a directory, survives restarts.
//!
//! Backends report failures through [`StorageError`]. The store treats every
//! failure as "persistence unavailable" and keeps working in memory.

mod file;
mod memory;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Errors reported by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A synchronous string-keyed key-value store.
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`. `Ok(None)` when absent.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Cloneable handle to a storage backend.
///
/// This is the type the injection container hands to stores, so one backend
/// is shared by every store resolved from the same container.
#[derive(Clone)]
pub struct SharedStorage(Arc<dyn KeyValueStorage>);

impl SharedStorage {
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self(Arc::new(storage))
    }

    pub fn from_arc(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self(storage)
    }

    pub fn memory() -> Self {
        Self::new(MemoryStorage::new())
    }
}

impl KeyValueStorage for SharedStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.0.remove_item(key)
    }
}

impl Default for SharedStorage {
    fn default() -> Self {
        Self::memory()
    }
}

impl fmt::Debug for SharedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedStorage").finish_non_exhaustive()
    }
}
