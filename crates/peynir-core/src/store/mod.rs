//! Durable key/value storage for cached forum documents and blobs.
//!
//! Every backend implements [`KeyValueStore`]. Structured documents
//! (category, topic and post lists) live in the ungrouped namespace;
//! binary blobs such as avatars and page snapshots live in named groups
//! so they can be evicted separately.
//!
//! Keys are stored verbatim. Callers substitute identifiers into key
//! templates before calling the store, and the store rejects keys that
//! still look like templates.

pub mod entry;
pub mod error;
pub mod file;
pub mod memory;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

pub use entry::{CacheEntry, CachedData};
pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Store handle shared by every resource in the process.
pub type SharedStore = Arc<dyn KeyValueStore>;

pub trait KeyValueStore: Send + Sync {
    /// Insert or replace the entry for `(key, group)`.
    ///
    /// On success the payload is durably readable. A concurrent `get`
    /// observes either the previous payload or the new one, never a mix.
    fn put(&self, key: &str, group: Option<&str>, payload: &[u8]) -> Result<(), StorageError>;

    fn get_entry(&self, key: &str, group: Option<&str>) -> Result<CacheEntry, StorageError>;

    fn get(&self, key: &str, group: Option<&str>) -> Result<Vec<u8>, StorageError> {
        self.get_entry(key, group).map(|entry| entry.payload)
    }

    /// Delete every entry in `group`, or everything the store manages when
    /// `group` is `None`.
    ///
    /// Individual failures are tolerated: the call succeeds when at least one
    /// deletion succeeded or there was nothing to delete.
    fn delete_all(&self, group: Option<&str>) -> Result<(), StorageError>;

    /// Size of one component: the document namespace for `None`, otherwise
    /// the named blob group.
    fn component_size_bytes(&self, group: Option<&str>) -> Result<u64, StorageError>;

    /// Names of the blob groups that currently hold data.
    fn groups(&self) -> Result<Vec<String>, StorageError>;

    fn total_size_bytes(&self) -> Result<u64, StorageError> {
        crate::maintenance::measure_usage(self).map(|usage| usage.total_bytes)
    }
}

/// Treat blank group names as the ungrouped namespace.
pub(crate) fn normalize_group(group: Option<&str>) -> Option<&str> {
    group.map(str::trim).filter(|g| !g.is_empty())
}

/// Reject keys that could escape the store or that still carry
/// unsubstituted template placeholders.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| Err(StorageError::InvalidKey(format!("{:?}: {}", key, reason)));

    if key.is_empty() {
        return invalid("empty key");
    }
    if key.contains(['%', '{', '}']) {
        return invalid("contains format specifier characters");
    }
    if key.contains(['\\', '\0']) {
        return invalid("contains a forbidden character");
    }
    if key.starts_with('/') {
        return invalid("absolute path");
    }
    if key
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return invalid("empty or relative path component");
    }
    Ok(())
}

pub(crate) fn validate_group(group: &str) -> Result<(), StorageError> {
    validate_key(group)?;
    if group.contains('/') {
        return Err(StorageError::InvalidKey(format!(
            "{:?}: group names cannot be nested",
            group
        )));
    }
    Ok(())
}

/// Load and decode a JSON document. `Ok(None)` means the key is not cached.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<CachedData<T>>> {
    let entry = match store.get_entry(key, None) {
        Ok(entry) => entry,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read cache entry: {}", key)),
    };

    let data: T = serde_json::from_slice(&entry.payload)
        .with_context(|| format!("Failed to parse cache entry: {}", key))?;

    Ok(Some(CachedData {
        data,
        cached_at: entry.written_at,
    }))
}

pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, data: &T) -> Result<()> {
    let contents = serde_json::to_vec(data)?;
    store
        .put(key, None, &contents)
        .with_context(|| format!("Failed to write cache entry: {}", key))
}
